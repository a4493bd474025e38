use crate::core::fallback::classify_all;
use crate::domain::model::{placeholder_year_label, Slice, AGGREGATE_GROUP_NAME, ALL_GROUPS};
use crate::domain::ports::PageFetcher;
use crate::domain::services::params::{decode_params, extract_params_blob};
use crate::domain::services::resolve_url;
use crate::utils::error::{EtlError, Result};
use futures::stream::{self, StreamExt};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::LazyLock;
use tokio_util::sync::CancellationToken;

const STATS_FEATURE: &str = "competitions-stats";

static YEAR_OPTION_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"option[value][data-ajax-link*="competitions-stats"]"#)
        .expect("valid year option selector")
});

static ANY_OPTION_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("option[value]").expect("valid option selector"));

static GROUP_BUTTON_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"[data-ajax-link*="params="]"#).expect("valid group button selector")
});

static FOUR_DIGIT_YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4})\b").expect("valid year regex"));

/// 年份下拉選單中的一個選項
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YearOption {
    pub value: String,
    pub label: String,
    pub ajax_link: String,
}

/// 分組按鈕
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupButton {
    pub name: String,
    pub link: String,
}

/// 找出 tournament 的所有 (year, group) slice：年份來自下拉選單，分組來自每個年份的 AJAX 片段；
/// 沒有年份下拉選單的頁面改用頁面上的分組按鈕
pub struct CombinationDiscoverer<'a, F: PageFetcher> {
    fetcher: &'a F,
    concurrency: usize,
}

impl<'a, F: PageFetcher> CombinationDiscoverer<'a, F> {
    pub fn new(fetcher: &'a F, concurrency: usize) -> Self {
        Self {
            fetcher,
            concurrency: concurrency.max(1),
        }
    }

    /// 讀取 tournament 頁面並找出所有 slice；頁面本身讀不到時為致命錯誤
    pub async fn discover(
        &self,
        domain: &str,
        tournament_path: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<Slice>> {
        let page_url = resolve_url(domain, tournament_path).map_err(|e| {
            EtlError::DiscoveryFailure {
                url: tournament_path.to_string(),
                message: e.to_string(),
            }
        })?;

        let html = match self.fetcher.fetch_html(&page_url, cancel).await {
            Ok(html) => html,
            Err(EtlError::Cancelled) => return Err(EtlError::Cancelled),
            Err(e) => {
                return Err(EtlError::DiscoveryFailure {
                    url: page_url,
                    message: e.to_string(),
                })
            }
        };

        let years = parse_year_options(&html);
        let slices = if years.is_empty() {
            tracing::info!("🔎 No year dropdown on {}, using single-level discovery", page_url);
            single_level_slices(&html)
        } else {
            tracing::info!("🔎 Found {} years on {}", years.len(), page_url);
            self.discover_per_year(domain, years, cancel).await?
        };

        Ok(dedup_slices(slices))
    }

    async fn discover_per_year(
        &self,
        domain: &str,
        years: Vec<YearOption>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Slice>> {
        let results: Vec<(YearOption, Result<String>)> = stream::iter(years)
            .map(|year| async move {
                let fetched = match resolve_url(domain, &year.ajax_link) {
                    Ok(url) => self.fetcher.fetch_html(&url, cancel).await,
                    Err(e) => Err(e),
                };
                (year, fetched)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut slices = Vec::new();
        for (year, fetched) in results {
            match fetched {
                Ok(fragment) => {
                    let year_slices = year_slices(&year, &fragment);
                    tracing::debug!(
                        "📅 Year {} ({}): {} slices",
                        year.label,
                        year.value,
                        year_slices.len()
                    );
                    slices.extend(year_slices);
                }
                Err(EtlError::Cancelled) => return Err(EtlError::Cancelled),
                Err(e) => {
                    tracing::warn!(
                        "⚠️ Skipping year {} ({}): groups could not be loaded: {}",
                        year.label,
                        year.value,
                        e
                    );
                }
            }
        }

        Ok(slices)
    }
}

/// 年份選項，依 value 去重
pub fn parse_year_options(html: &str) -> Vec<YearOption> {
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut years = Vec::new();

    for option in document.select(&YEAR_OPTION_SELECTOR) {
        let value = option.value().attr("value").unwrap_or_default().trim();
        let ajax_link = option.value().attr("data-ajax-link").unwrap_or_default().trim();
        if value.is_empty() || ajax_link.is_empty() || !seen.insert(value.to_string()) {
            continue;
        }

        years.push(YearOption {
            value: value.to_string(),
            label: year_label(&element_text(&option), value),
            ajax_link: ajax_link.to_string(),
        });
    }

    years
}

/// 統計功能範圍內、帶 params blob 的分組按鈕
pub fn parse_group_buttons(html: &str) -> Vec<GroupButton> {
    let document = Html::parse_fragment(html);

    document
        .select(&GROUP_BUTTON_SELECTOR)
        .filter(|el| el.value().name() != "option")
        .filter_map(|el| {
            let link = el.value().attr("data-ajax-link")?;
            link.contains(STATS_FEATURE).then(|| GroupButton {
                name: element_text(&el),
                link: link.to_string(),
            })
        })
        .collect()
}

/// 某一年份 AJAX 片段中的 slice；沒有任何分組時回傳單一整體統計 slice
pub fn year_slices(year: &YearOption, fragment: &str) -> Vec<Slice> {
    let slices: Vec<Slice> = parse_group_buttons(fragment)
        .into_iter()
        .map(|button| {
            let group_id = extract_params_blob(&button.link)
                .map(|blob| decode_params(blob).group_id)
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| ALL_GROUPS.to_string());
            let group_name = group_name(&group_id, &button.name);
            Slice::new(year.value.clone(), year.label.clone(), group_id, group_name)
        })
        .collect();

    if slices.is_empty() {
        vec![Slice::aggregate(year.value.clone(), year.label.clone())]
    } else {
        slices
    }
}

/// 沒有年份下拉選單時，直接從頁面上的分組按鈕組出 slice
pub fn single_level_slices(html: &str) -> Vec<Slice> {
    let labels = option_year_labels(html);
    let buttons = parse_group_buttons(html);

    let classified = classify_all(buttons, |button| -> std::result::Result<Slice, String> {
        let blob = extract_params_blob(&button.link)
            .ok_or_else(|| format!("button '{}' has no params blob", button.name))?;
        let params = decode_params(blob);
        if params.year_id.is_empty() {
            return Err(format!("button '{}' carries no YEAR_ID", button.name));
        }

        let group_id = if params.group_id.is_empty() {
            ALL_GROUPS.to_string()
        } else {
            params.group_id
        };
        let year_label = labels
            .get(&params.year_id)
            .cloned()
            .unwrap_or_else(|| placeholder_year_label(&params.year_id));
        let group_name = group_name(&group_id, &button.name);

        Ok(Slice::new(params.year_id, year_label, group_id, group_name))
    });

    for reason in &classified.rejected {
        tracing::warn!("⚠️ Ignoring group button: {}", reason);
    }

    classified.accepted
}

/// 依 (year_id, group_id) 去重並排序
pub fn dedup_slices(slices: Vec<Slice>) -> Vec<Slice> {
    let mut unique: BTreeMap<(String, String), Slice> = BTreeMap::new();
    for slice in slices {
        unique
            .entry((slice.year_id.clone(), slice.group_id.clone()))
            .or_insert(slice);
    }
    unique.into_values().collect()
}

/// 任何下拉選單中 value → 四位數年份標籤
fn option_year_labels(html: &str) -> HashMap<String, String> {
    let document = Html::parse_document(html);
    let mut labels = HashMap::new();

    for option in document.select(&ANY_OPTION_SELECTOR) {
        let value = option.value().attr("value").unwrap_or_default().trim();
        if value.is_empty() {
            continue;
        }
        if let Some(caps) = FOUR_DIGIT_YEAR.captures(&element_text(&option)) {
            labels
                .entry(value.to_string())
                .or_insert_with(|| caps[1].to_string());
        }
    }

    labels
}

fn year_label(text: &str, value: &str) -> String {
    FOUR_DIGIT_YEAR
        .captures(text)
        .map(|caps| caps[1].to_string())
        .unwrap_or_else(|| placeholder_year_label(value))
}

fn group_name(group_id: &str, button_text: &str) -> String {
    if group_id == ALL_GROUPS || button_text.is_empty() {
        AGGREGATE_GROUP_NAME.to_string()
    } else {
        button_text.to_string()
    }
}

fn element_text(el: &ElementRef) -> String {
    el.text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
