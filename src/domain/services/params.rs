use crate::domain::model::ALL_GROUPS;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

const YEAR_KEY: &str = "YEAR_ID";
const GROUP_KEY: &str = "GROUP_ID";

static PARAMS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[?&]params=([^&#\s]+)").expect("valid params regex"));

/// 從 blob 還原出的 (year, group)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SliceParams {
    pub year_id: String,
    pub group_id: String,
}

#[derive(Debug, Clone, PartialEq)]
enum Scalar {
    Str(String),
    Number(String),
    Bool(bool),
    Null,
}

impl Scalar {
    fn text(&self) -> String {
        match self {
            Scalar::Str(s) | Scalar::Number(s) => s.clone(),
            Scalar::Bool(_) | Scalar::Null => String::new(),
        }
    }
}

/// 取出 link 中 `params=` 的原始值
pub fn extract_params_blob(link: &str) -> Option<&str> {
    PARAMS_RE
        .captures(link)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// 解碼 AJAX 連結中的 `params=` blob：URL 跳脫的 base64，內容為 PHP serialize 的陣列，
/// 例如 `a:2:{s:7:"YEAR_ID";s:4:"1794";s:8:"GROUP_ID";s:3:"512";}`
///
/// 解碼失敗時回傳空字串欄位，不讓呼叫端失敗
pub fn decode_params(raw: &str) -> SliceParams {
    let Some(bytes) = decode_blob(raw) else {
        tracing::debug!("🔓 Could not base64-decode params blob: {}", raw);
        return SliceParams::default();
    };

    let pairs = parse_serialized_pairs(&bytes);
    if pairs.is_empty() {
        tracing::debug!("🔓 Params blob holds no serialized pairs: {}", raw);
        return SliceParams::default();
    }

    let year_id = pairs.get(YEAR_KEY).map(Scalar::text).unwrap_or_default();
    let group_id = match pairs.get(GROUP_KEY) {
        None | Some(Scalar::Null) => ALL_GROUPS.to_string(),
        Some(value) => {
            let text = value.text();
            if text.is_empty() {
                ALL_GROUPS.to_string()
            } else {
                text
            }
        }
    };

    SliceParams { year_id, group_id }
}

/// 以網站相同格式產生 blob；`group_id` 為 None 時寫入 null
pub fn encode_params(year_id: &str, group_id: Option<&str>) -> String {
    let group = match group_id {
        Some(id) => format!("s:{}:\"{}\";", id.len(), id),
        None => "N;".to_string(),
    };
    let serialized = format!(
        "a:2:{{s:{}:\"{}\";s:{}:\"{}\";s:{}:\"{}\";{}}}",
        YEAR_KEY.len(),
        YEAR_KEY,
        year_id.len(),
        year_id,
        GROUP_KEY.len(),
        GROUP_KEY,
        group
    );
    urlencoding::encode(&STANDARD.encode(serialized)).into_owned()
}

fn decode_blob(raw: &str) -> Option<Vec<u8>> {
    let unescaped = urlencoding::decode(raw.trim())
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw.trim().to_string());

    if unescaped.is_empty() {
        return None;
    }

    STANDARD
        .decode(&unescaped)
        .or_else(|_| STANDARD_NO_PAD.decode(unescaped.trim_end_matches('=')))
        .or_else(|_| URL_SAFE.decode(&unescaped))
        .or_else(|_| URL_SAFE_NO_PAD.decode(unescaped.trim_end_matches('=')))
        .ok()
}

/// 解析 serialized array 的 key/value，遇到無法辨識的 token 即停止，保留已解析的部分
fn parse_serialized_pairs(input: &[u8]) -> HashMap<String, Scalar> {
    let mut cursor = Cursor { input, pos: 0 };
    let mut pairs = HashMap::new();

    if cursor.peek() == Some(b'a') {
        let header = cursor
            .eat(b'a')
            .and_then(|_| cursor.eat(b':'))
            .and_then(|_| cursor.read_until(b':'))
            .and_then(|_| cursor.eat(b'{'));
        if header.is_none() {
            return pairs;
        }
    }

    while let Some(next) = cursor.peek() {
        if next == b'}' {
            break;
        }
        let Some(key) = cursor.scalar() else { break };
        let Some(value) = cursor.scalar() else { break };
        pairs.insert(key.text(), value);
    }

    pairs
}

struct Cursor<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn eat(&mut self, expected: u8) -> Option<()> {
        if self.peek()? == expected {
            self.pos += 1;
            Some(())
        } else {
            None
        }
    }

    /// 讀到 `delimiter` 為止（不含），並吃掉 delimiter
    fn read_until(&mut self, delimiter: u8) -> Option<&'a [u8]> {
        let rest = &self.input[self.pos..];
        let offset = rest.iter().position(|&b| b == delimiter)?;
        self.pos += offset + 1;
        Some(&rest[..offset])
    }

    fn scalar(&mut self) -> Option<Scalar> {
        match self.peek()? {
            b'N' => {
                self.eat(b'N')?;
                self.eat(b';')?;
                Some(Scalar::Null)
            }
            b's' => {
                self.eat(b's')?;
                self.eat(b':')?;
                let len: usize = std::str::from_utf8(self.read_until(b':')?).ok()?.parse().ok()?;
                self.eat(b'"')?;
                let end = self.pos.checked_add(len)?;
                let bytes = self.input.get(self.pos..end)?;
                self.pos = end;
                self.eat(b'"')?;
                self.eat(b';')?;
                Some(Scalar::Str(String::from_utf8_lossy(bytes).into_owned()))
            }
            tag @ (b'i' | b'd' | b'b') => {
                self.eat(tag)?;
                self.eat(b':')?;
                let raw = std::str::from_utf8(self.read_until(b';')?).ok()?.trim().to_string();
                if tag == b'b' {
                    Some(Scalar::Bool(raw == "1"))
                } else {
                    Some(Scalar::Number(raw))
                }
            }
            _ => None,
        }
    }
}
