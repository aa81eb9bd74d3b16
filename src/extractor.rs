use chrono::NaiveDateTime;
use regex::Regex;
use serde_json::{json, Value};

use crate::error::Result;
use crate::model_client::{call, parse_json_response, VisionModel};
use crate::models::{Annotation, BackInfo, FrontInfo, ReceiptImage, Roster};

/// Purpose category that carries a night-shift worker name.
pub const NIGHT_MEAL: &str = "야근식대";

pub const PURPOSES: &[&str] = &[
    "외근식대",
    "야근식대",
    "유류대",
    "통행료",
    "주간식대",
    "교통비",
    "숙박비",
    "회식비",
    "부서간식대",
];

// ---------------------------------------------------------------------------
// Prompts
// ---------------------------------------------------------------------------

const FRONT_PROMPT: &str = r#"Extract the printed receipt fields from this image. The top of the receipt may carry handwriting; ignore it and read only the printed receipt.

date: the transaction date and time as YYYY-MM-DD HH:MM. Drop seconds. If the time is missing, return "".
  "승인일시 2025-07-22 18:34:23" -> "2025-07-22 18:34"
  "거래일시:25-07-22(화) 15:06:04" -> "2025-07-22 15:06"
  "2025/07/17 15:26:23" -> "2025-07-17 15:26"
  "[일시] 2025/07/14 11:43" -> "2025-07-14 11:43"
price: the paid amount, digits only (e.g. "12700").
vendor: the printed shop or merchant name near the date (e.g. 청원, 탐앤탐스, GS25). Payment processors such as 엔에이치엔케이씨피 주식회사 are not vendors.
card: the card company, holder and masked number (e.g. 신한카드법인 451844***).
address: the address printed for the shop.

Return exactly one JSON object:
{"date": "...", "price": "...", "vendor": "...", "card": "...", "address": "..."}"#;

fn back_prompt(roster: &Roster) -> String {
    let names = roster
        .names()
        .iter()
        .map(|n| format!("\"{n}\""))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "Read the handwritten employee name and travel route on the back of this receipt.\n\
         employee must be one of: {names}. If no name is written, return \"\".\n\
         route is written as origin-destination, e.g. 회사-집.\n\n\
         Return exactly one JSON object:\n\
         {{\"employee\": \"...\", \"route\": \"...\"}}"
    )
}

/// Roster names followed by any initials-table names not already listed.
fn night_worker_candidates(roster: &Roster) -> Vec<&str> {
    let mut names: Vec<&str> = roster.names().iter().map(String::as_str).collect();
    for name in roster.initials().values() {
        if !names.contains(&name.as_str()) {
            names.push(name);
        }
    }
    names
}

fn annotation_prompt(roster: &Roster, front: &FrontInfo) -> String {
    let printed = json!({
        "date": front.date,
        "price": front.amount,
        "vendor": front.vendor,
        "purpose": front.purpose,
        "card": front.card_note,
        "address": front.address,
    });
    let names = night_worker_candidates(roster).join(", ");
    let initials = roster
        .initials()
        .iter()
        .map(|(k, v)| format!("{k} = {v}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "Read the handwritten annotations at the top of this receipt. The printed part was already read as: {printed}\n\n\
         purpose: one of {purposes}. 외근식대 is marked 외근, 출장 or 접대비. 야근식대 applies to meals paid after 17:30 near the office. \
         Fuel stations are 유류대, toll top-ups 통행료, motels 숙박비, taxis 교통비. If none fits, copy the handwriting.\n\
         night_worker: only when purpose is 야근식대, the person written on the receipt; otherwise \"\". \
         Names may be written in full ({names}) or as two-letter initials ({initials}); return the full name.\n\
         card_note: 법인카드 for the corporate card (신한카드법인, numbers starting 451844), \
         or 개인카드(name) for a personal card, with the full name.\n\n\
         Return exactly one JSON object:\n\
         {{\"purpose\": \"...\", \"night_worker\": \"...\", \"card_note\": \"...\"}}",
        purposes = PURPOSES.join(", "),
    )
}

// ---------------------------------------------------------------------------
// Field helpers
// ---------------------------------------------------------------------------

/// Read `key` from a model reply as a string; anything missing or odd becomes "".
pub fn field_str(value: &Value, key: &str) -> String {
    match value.get(key) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// Keep only the integer digits of an amount: "12,700원" -> "12700",
/// "7500.00" -> "7500". A dot that is not a one- or two-digit decimal part
/// ("12.700") is ambiguous, so the text is returned as read and never parses
/// as an amount.
pub fn normalize_amount(raw: &str) -> String {
    let raw = raw.trim();
    let amount = raw.trim_end_matches('원').trim_end();
    let whole = match amount.rsplit_once('.') {
        Some((head, tail))
            if (1..=2).contains(&tail.len()) && tail.chars().all(|c| c.is_ascii_digit()) =>
        {
            head
        }
        Some(_) => return raw.to_string(),
        None => amount,
    };
    if whole.contains('.') {
        return raw.to_string();
    }
    whole.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Bring a model timestamp to `YYYY-MM-DD HH:MM`; unrecognised text is kept as-is.
pub fn normalize_timestamp(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return String::new();
    }
    const FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M",
        "%Y-%m-%d %H:%M:%S",
        "%Y/%m/%d %H:%M",
        "%Y/%m/%d %H:%M:%S",
        "%Y.%m.%d %H:%M",
        "%Y.%m.%d %H:%M:%S",
    ];
    FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(raw, f).ok())
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| raw.to_string())
}

/// Collapse arrow-like separators in a route to a single hyphen: "회사 → 집" -> "회사-집".
pub fn normalize_route(raw: &str) -> String {
    Regex::new(r"\s*(?:->|=>|[→➡⇒>~])+\s*")
        .map(|re| re.replace_all(raw.trim(), "-").to_string())
        .unwrap_or_else(|_| raw.trim().to_string())
}

/// `YYYY-MM-DD...` -> `(MM/DD)`; any other input is returned unchanged.
pub fn reformat_date(raw: &str) -> String {
    if raw.trim().is_empty() {
        return raw.to_string();
    }
    Regex::new(r"^(\d{4})-(\d{2})-(\d{2})")
        .ok()
        .and_then(|re| {
            re.captures(raw)
                .map(|caps| format!("({}/{})", &caps[2], &caps[3]))
        })
        .unwrap_or_else(|| raw.to_string())
}

/// Resolve initials inside a card note such as `개인카드(KY)`.
fn resolve_card_note(raw: &str, roster: &Roster) -> String {
    Regex::new(r"\(([A-Za-z]{2})\)")
        .map(|re| {
            re.replace_all(raw.trim(), |caps: &regex::Captures| {
                format!("({})", roster.resolve(&caps[1]))
            })
            .to_string()
        })
        .unwrap_or_else(|_| raw.trim().to_string())
}

// ---------------------------------------------------------------------------
// Extractor
// ---------------------------------------------------------------------------

pub struct Extractor<'a> {
    model: &'a dyn VisionModel,
    roster: &'a Roster,
}

impl<'a> Extractor<'a> {
    pub fn new(model: &'a dyn VisionModel, roster: &'a Roster) -> Self {
        Self { model, roster }
    }

    pub fn extract_front(&self, image: &ReceiptImage) -> Result<FrontInfo> {
        let reply = call(self.model, image, FRONT_PROMPT)?;
        let value = parse_json_response(&reply)?;
        Ok(FrontInfo {
            date: normalize_timestamp(&field_str(&value, "date")),
            amount: normalize_amount(&field_str(&value, "price")),
            vendor: field_str(&value, "vendor"),
            purpose: String::new(),
            card_note: field_str(&value, "card"),
            address: field_str(&value, "address"),
        })
    }

    pub fn extract_back(&self, image: &ReceiptImage) -> Result<BackInfo> {
        let reply = call(self.model, image, &back_prompt(self.roster))?;
        let value = parse_json_response(&reply)?;
        let employee = self.roster.resolve(&field_str(&value, "employee"));
        if !employee.is_empty() && !self.roster.contains(&employee) {
            log::debug!("{}: employee {employee:?} is not on the roster", image.file_name());
        }
        Ok(BackInfo {
            employee,
            route: normalize_route(&field_str(&value, "route")),
        })
    }

    pub fn extract_purpose_and_employee(
        &self,
        image: &ReceiptImage,
        front: &FrontInfo,
    ) -> Result<Annotation> {
        let reply = call(self.model, image, &annotation_prompt(self.roster, front))?;
        let value = parse_json_response(&reply)?;
        let purpose = field_str(&value, "purpose");
        let night_worker = if purpose == NIGHT_MEAL {
            self.roster.resolve(&field_str(&value, "night_worker"))
        } else {
            String::new()
        };
        Ok(Annotation {
            purpose,
            night_worker,
            card_note: resolve_card_note(&field_str(&value, "card_note"), self.roster),
        })
    }
}


#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::prompt_markers::{BACK, FRONT, NOTES};
    use super::*;
    use crate::model_client::testing::ScriptedModel;

    fn roster() -> Roster {
        let mut initials = BTreeMap::new();
        initials.insert("KY".to_string(), "손근영".to_string());
        initials.insert("IH".to_string(), "이인호".to_string());
        Roster::new(
            vec!["손근영".to_string(), "이인호".to_string()],
            initials,
        )
    }

    fn image(dir: &tempfile::TempDir, name: &str, bytes: &[u8]) -> ReceiptImage {
        let path = dir.path().join(name);
        std::fs::write(&path, bytes).unwrap();
        ReceiptImage::new(path)
    }

    #[test]
    fn test_prompt_markers_are_distinct() {
        let r = roster();
        assert!(FRONT_PROMPT.contains(FRONT));
        assert!(!FRONT_PROMPT.contains(BACK) && !FRONT_PROMPT.contains(NOTES));
        let back = back_prompt(&r);
        assert!(back.contains(BACK) && !back.contains(FRONT) && !back.contains(NOTES));
        let notes = annotation_prompt(&r, &FrontInfo::default());
        assert!(notes.contains(NOTES) && !notes.contains(FRONT) && !notes.contains(BACK));
    }

    #[test]
    fn test_night_worker_candidates_include_initials_names() {
        let mut initials = BTreeMap::new();
        initials.insert("IH".to_string(), "이인호".to_string());
        initials.insert("KY".to_string(), "손근영".to_string());
        let r = Roster::new(vec!["손근영".to_string(), "박다혜".to_string()], initials);

        assert_eq!(night_worker_candidates(&r), vec!["손근영", "박다혜", "이인호"]);
        let notes = annotation_prompt(&r, &FrontInfo::default());
        assert!(notes.contains("(손근영, 박다혜, 이인호)"));
    }

    #[test]
    fn test_reformat_date() {
        assert_eq!(reformat_date("2025-07-22 18:34"), "(07/22)");
        assert_eq!(reformat_date("2025-07-22"), "(07/22)");
        assert_eq!(reformat_date(""), "");
        assert_eq!(reformat_date("not-a-date"), "not-a-date");
        assert_eq!(reformat_date("(07/22)"), "(07/22)");
        assert_eq!(reformat_date("25-07-22 15:06"), "25-07-22 15:06");
    }

    #[test]
    fn test_normalize_route() {
        assert_eq!(normalize_route("회사→집"), "회사-집");
        assert_eq!(normalize_route("회사 ➡ 집"), "회사-집");
        assert_eq!(normalize_route("회사 -> 거래처"), "회사-거래처");
        assert_eq!(normalize_route("여의도~~강남"), "여의도-강남");
        assert_eq!(normalize_route("회사-집"), "회사-집");
        assert_eq!(normalize_route(""), "");
    }

    #[test]
    fn test_normalize_amount() {
        assert_eq!(normalize_amount("12,700원"), "12700");
        assert_eq!(normalize_amount("23000"), "23000");
        assert_eq!(normalize_amount("7500.00"), "7500");
        assert_eq!(normalize_amount("7500.5원"), "7500");
        assert_eq!(normalize_amount(""), "");
    }

    #[test]
    fn test_dotted_thousands_is_not_truncated() {
        assert_eq!(normalize_amount("12.700"), "12.700");
        assert_eq!(normalize_amount("1.234.500원"), "1.234.500원");
        assert_eq!(crate::pipeline::parse_amount(&normalize_amount("12.700")), None);
    }

    #[test]
    fn test_normalize_timestamp() {
        assert_eq!(normalize_timestamp("2025-07-22 18:34"), "2025-07-22 18:34");
        assert_eq!(normalize_timestamp("2025-07-22 18:34:23"), "2025-07-22 18:34");
        assert_eq!(normalize_timestamp("2025/07/17 15:26"), "2025-07-17 15:26");
        assert_eq!(normalize_timestamp(" "), "");
        assert_eq!(normalize_timestamp("yesterday"), "yesterday");
    }

    #[test]
    fn test_field_str_defaults() {
        let v = json!({"a": " x ", "b": 12700, "c": null, "d": ["x"]});
        assert_eq!(field_str(&v, "a"), "x");
        assert_eq!(field_str(&v, "b"), "12700");
        assert_eq!(field_str(&v, "c"), "");
        assert_eq!(field_str(&v, "d"), "");
        assert_eq!(field_str(&v, "missing"), "");
        assert_eq!(field_str(&json!("text"), "a"), "");
    }

    #[test]
    fn test_extract_front() {
        let dir = tempfile::tempdir().unwrap();
        let img = image(&dir, "a.jpg", b"A");
        let model = ScriptedModel::new().reply(
            b"A",
            FRONT,
            "```json\n{\"date\": \"2025-07-22 18:34:23\", \"price\": \"12,700원\", \"vendor\": \"GS25\", \"card\": \"신한카드법인 451844***\"}\n```",
        );
        let r = roster();
        let front = Extractor::new(&model, &r).extract_front(&img).unwrap();
        assert_eq!(front.date, "2025-07-22 18:34");
        assert_eq!(front.amount, "12700");
        assert_eq!(front.vendor, "GS25");
        assert_eq!(front.card_note, "신한카드법인 451844***");
        assert_eq!(front.address, "");
    }

    #[test]
    fn test_extract_front_bad_json_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let img = image(&dir, "a.jpg", b"A");
        let model = ScriptedModel::new().reply(b"A", FRONT, "sorry, no receipt here");
        let r = roster();
        assert!(Extractor::new(&model, &r).extract_front(&img).is_err());
    }

    #[test]
    fn test_extract_back_normalizes_route_and_initials() {
        let dir = tempfile::tempdir().unwrap();
        let img = image(&dir, "b.jpg", b"B");
        let model = ScriptedModel::new().reply(
            b"B",
            BACK,
            r#"{"employee": "KY", "route": "회사 → 집"}"#,
        );
        let r = roster();
        let back = Extractor::new(&model, &r).extract_back(&img).unwrap();
        assert_eq!(back.employee, "손근영");
        assert_eq!(back.route, "회사-집");
    }

    #[test]
    fn test_extract_back_accepts_off_roster_name() {
        let dir = tempfile::tempdir().unwrap();
        let img = image(&dir, "b.jpg", b"B");
        let model = ScriptedModel::new().reply(b"B", BACK, r#"{"employee": "홍길동"}"#);
        let r = roster();
        let back = Extractor::new(&model, &r).extract_back(&img).unwrap();
        assert_eq!(back.employee, "홍길동");
        assert_eq!(back.route, "");
    }

    #[test]
    fn test_annotation_night_worker_only_for_night_meal() {
        let dir = tempfile::tempdir().unwrap();
        let img = image(&dir, "c.jpg", b"C");
        let model = ScriptedModel::new().reply(
            b"C",
            NOTES,
            r#"{"purpose": "외근식대", "night_worker": "이인호", "card_note": "법인카드"}"#,
        );
        let r = roster();
        let notes = Extractor::new(&model, &r)
            .extract_purpose_and_employee(&img, &FrontInfo::default())
            .unwrap();
        assert_eq!(notes.purpose, "외근식대");
        assert_eq!(notes.night_worker, "");
        assert_eq!(notes.card_note, "법인카드");
    }

    #[test]
    fn test_annotation_resolves_initials() {
        let dir = tempfile::tempdir().unwrap();
        let img = image(&dir, "d.jpg", b"D");
        let model = ScriptedModel::new().reply(
            b"D",
            NOTES,
            r#"{"purpose": "야근식대", "night_worker": "ih", "card_note": "개인카드(KY)"}"#,
        );
        let r = roster();
        let notes = Extractor::new(&model, &r)
            .extract_purpose_and_employee(&img, &FrontInfo::default())
            .unwrap();
        assert_eq!(notes.night_worker, "이인호");
        assert_eq!(notes.card_note, "개인카드(손근영)");
    }
}
