use crate::utils::error::{EtlError, Result};
use std::future::Future;

/// classify 的結果：成功項目與被拒絕的原因
#[derive(Debug, Clone, PartialEq)]
pub struct Classified<T, R> {
    pub accepted: Vec<T>,
    pub rejected: Vec<R>,
}

impl<T, R> Default for Classified<T, R> {
    fn default() -> Self {
        Self {
            accepted: Vec::new(),
            rejected: Vec::new(),
        }
    }
}

/// 對每個項目執行 `classify`，Ok 收進 accepted，Err 收進 rejected
pub fn classify_all<I, T, R, F>(items: I, mut classify: F) -> Classified<T, R>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> std::result::Result<T, R>,
{
    let mut classified = Classified::default();
    for item in items {
        match classify(item) {
            Ok(value) => classified.accepted.push(value),
            Err(reason) => classified.rejected.push(reason),
        }
    }
    classified
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Batch,
    PerUnit,
}

/// 降級重試後的結果
#[derive(Debug)]
pub struct DegradedOutcome<R> {
    pub granularity: Granularity,
    pub succeeded: u64,
    pub rejected: Vec<R>,
    /// 觸發逐筆處理的批次錯誤
    pub batch_error: Option<EtlError>,
}

/// 先整批嘗試；失敗則逐筆處理，每筆失敗轉成一個 rejection
///
/// `batch` 回傳 (成功數, 批次內已知的 rejection)。逐筆階段的成功數以成功的筆數計。
pub async fn batch_then_each<'a, T, R, B, BFut, U, UFut, C>(
    items: &'a [T],
    batch: B,
    mut unit: U,
    mut on_unit_error: C,
) -> DegradedOutcome<R>
where
    B: FnOnce(&'a [T]) -> BFut,
    BFut: Future<Output = Result<(u64, Vec<R>)>>,
    U: FnMut(&'a T) -> UFut,
    UFut: Future<Output = Result<()>>,
    C: FnMut(&'a T, EtlError) -> R,
{
    let batch_error = match batch(items).await {
        Ok((succeeded, rejected)) => {
            return DegradedOutcome {
                granularity: Granularity::Batch,
                succeeded,
                rejected,
                batch_error: None,
            }
        }
        Err(e) => e,
    };

    tracing::warn!(
        "🔁 Batch of {} failed ({}), retrying one at a time",
        items.len(),
        batch_error
    );

    let mut succeeded = 0;
    let mut rejected = Vec::new();
    for item in items {
        match unit(item).await {
            Ok(()) => succeeded += 1,
            Err(e) => rejected.push(on_unit_error(item, e)),
        }
    }

    DegradedOutcome {
        granularity: Granularity::PerUnit,
        succeeded,
        rejected,
        batch_error: Some(batch_error),
    }
}
