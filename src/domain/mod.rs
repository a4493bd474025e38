// Domain layer: core models, ports (interfaces) and the site-specific services built on them.

pub mod model;
pub mod ports;

pub mod services;
