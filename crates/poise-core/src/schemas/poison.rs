//! Poisoned bodies for analytics requests the page world cannot simply drop.
//!
//! Two shapes: a synthetic heartbeat that replaces the real body in strict
//! mode, and key-aware value substitution that keeps a JSON body's structure
//! but replaces identifying fields with clearly synthetic values.

use serde_json::{json, Map, Value};

use crate::params::to_base36;
use crate::persona::{PERSONA_LOCALE, PERSONA_TZ};
use crate::policy::{PoisonConfig, DEFAULT_DEFUNCT_NAMES};
use crate::prng::NoiseSource;
use crate::url::QueryParams;

const HEARTBEAT: &str = "heartbeat";

/// Build the replacement body for a poisoned request.
///
/// Form-encoded bodies keep their fields and gain `e`, `rid`, `ts`, `j`.
/// Everything else is treated as JSON: the original object (if any) is kept
/// and overlaid with the heartbeat fields.
pub fn build_poison<R: NoiseSource>(
    body: Option<&str>,
    content_type: &str,
    ts: u64,
    cfg: &PoisonConfig,
    rng: &mut R,
) -> String {
    let rid = format!(
        "{}{}",
        to_base36((rng.next_f64() * 1e9) as u64),
        to_base36((rng.next_f64() * 1e9) as u64)
    );
    let jitter = (rng.next_f64() * 1000.0) as u64;

    if content_type.to_ascii_lowercase().contains("application/x-www-form-urlencoded") {
        let mut params = QueryParams::parse(body.unwrap_or(""));
        params.set("e", HEARTBEAT);
        if cfg.include_rid {
            params.set("rid", rid);
        }
        params.set("ts", ts.to_string());
        if cfg.include_jitter {
            params.set("j", jitter.to_string());
        }
        return params.encode();
    }

    let mut obj = match body.and_then(|b| serde_json::from_str::<Value>(b).ok()) {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };
    obj.insert("event".into(), json!(HEARTBEAT));
    obj.insert("ts".into(), json!(ts));
    obj.insert("meta".into(), json!({ "locale": PERSONA_LOCALE, "tz": PERSONA_TZ }));
    if cfg.include_rid {
        obj.insert("rid".into(), json!(rid));
    }
    if cfg.include_jitter {
        obj.insert("jitter".into(), json!(jitter));
    }
    if cfg.include_fake_pii {
        obj.insert(
            "pii".into(),
            json!({
                "email": fake_email(rng),
                "name": fake_name(rng),
                "phone": fake_phone(rng),
            }),
        );
    }
    Value::Object(obj).to_string()
}

// =============================================================================
// Key-aware substitution
// =============================================================================

/// What a field name suggests it carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Email,
    Phone,
    Name,
    Identifier,
    Organization,
}

const ORG_HINTS: &[&str] = &[
    "brand", "company", "org", "vendor", "employer", "advertiser", "client", "app", "product", "agency",
];

/// Classify a field name. Checks run most specific first.
pub fn classify_key(key: &str) -> Option<FieldKind> {
    let k = key.to_ascii_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| k.contains(n));
    if has(&["email"]) {
        Some(FieldKind::Email)
    } else if has(&["phone", "tel"]) {
        Some(FieldKind::Phone)
    } else if has(&["name", "first", "last"]) {
        Some(FieldKind::Name)
    } else if has(&["uuid", "id", "cid"]) {
        Some(FieldKind::Identifier)
    } else if has(ORG_HINTS) {
        Some(FieldKind::Organization)
    } else {
        None
    }
}

/// Replace identifying values throughout a JSON document.
///
/// Objects and arrays are walked recursively; array elements are never
/// replaced directly since they have no key to classify.
pub fn scrub_json<R: NoiseSource>(value: Value, cfg: &PoisonConfig, rng: &mut R) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| {
                    let v = match v {
                        Value::Object(_) | Value::Array(_) => scrub_json(v, cfg, rng),
                        other => match classify_key(&k) {
                            Some(kind) => Value::String(fake_value(kind, cfg, rng)),
                            None => other,
                        },
                    };
                    (k, v)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(|v| scrub_json(v, cfg, rng)).collect()),
        other => other,
    }
}

/// Scrub a JSON text body. Non-JSON input is returned as `None`.
pub fn scrub_json_body<R: NoiseSource>(body: &str, cfg: &PoisonConfig, rng: &mut R) -> Option<String> {
    let parsed: Value = serde_json::from_str(body).ok()?;
    Some(scrub_json(parsed, cfg, rng).to_string())
}

pub fn fake_value<R: NoiseSource>(kind: FieldKind, cfg: &PoisonConfig, rng: &mut R) -> String {
    match kind {
        FieldKind::Email => fake_email(rng),
        FieldKind::Phone => fake_phone(rng),
        FieldKind::Name => fake_name(rng),
        FieldKind::Identifier => fake_uuid(rng),
        FieldKind::Organization => fake_defunct(cfg, rng),
    }
}

pub fn fake_email<R: NoiseSource>(rng: &mut R) -> String {
    format!("user{}@example.com", (rng.next_f64() * 1e6) as u32)
}

pub fn fake_phone<R: NoiseSource>(rng: &mut R) -> String {
    format!("+1{}", 2_000_000_000u64 + (rng.next_f64() * 799_999_999.0) as u64)
}

pub fn fake_name<R: NoiseSource>(rng: &mut R) -> String {
    format!("John Doe {}", rng.below(1000))
}

pub fn fake_uuid<R: NoiseSource>(rng: &mut R) -> String {
    let mut group = || format!("{:04x}", rng.below(0x10000));
    let a = format!("{}{}", group(), group());
    let (b, c, d) = (group(), group(), group());
    let e = format!("{}{}{}", group(), group(), group());
    format!("{a}-{b}-{c}-{d}-{e}")
}

/// A defunct company name, from the configured list if it has usable entries.
pub fn fake_defunct<R: NoiseSource>(cfg: &PoisonConfig, rng: &mut R) -> String {
    let custom: Vec<&str> = cfg
        .defunct_names
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();
    let picked = if custom.is_empty() {
        rng.pick(DEFAULT_DEFUNCT_NAMES).copied()
    } else {
        rng.pick(&custom).copied()
    };
    picked.unwrap_or("Nortel").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prng::Mulberry32;

    #[test]
    fn test_heartbeat_json() {
        let cfg = PoisonConfig::default();
        let out = build_poison(Some(r#"{"page":"/cart","event":"purchase"}"#), "application/json", 1234, &cfg, &mut Mulberry32::new(1));
        let v: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["event"], "heartbeat");
        assert_eq!(v["page"], "/cart");
        assert_eq!(v["ts"], 1234);
        assert_eq!(v["meta"], json!({"locale": "en-US", "tz": "UTC"}));
        assert!(v["rid"].as_str().is_some_and(|r| !r.is_empty()));
        assert!(v["jitter"].as_u64().is_some_and(|j| j < 1000));
        assert!(v.get("pii").is_none());
    }

    #[test]
    fn test_heartbeat_options() {
        let cfg = PoisonConfig {
            include_rid: false,
            include_jitter: false,
            include_fake_pii: true,
            defunct_names: Vec::new(),
        };
        let out = build_poison(None, "", 1, &cfg, &mut Mulberry32::new(2));
        let v: Value = serde_json::from_str(&out).unwrap();
        assert!(v.get("rid").is_none());
        assert!(v.get("jitter").is_none());
        assert!(v["pii"]["email"].as_str().unwrap().ends_with("@example.com"));
        assert!(v["pii"]["phone"].as_str().unwrap().starts_with("+1"));
    }

    #[test]
    fn test_heartbeat_form() {
        let cfg = PoisonConfig::default();
        let out = build_poison(Some("v=2&tid=G-1"), "application/x-www-form-urlencoded; charset=UTF-8", 99, &cfg, &mut Mulberry32::new(3));
        let q = QueryParams::parse(&out);
        assert_eq!(q.get("v"), Some("2"));
        assert_eq!(q.get("e"), Some("heartbeat"));
        assert_eq!(q.get("ts"), Some("99"));
        assert!(q.has("rid") && q.has("j"));
    }

    #[test]
    fn test_classify_key() {
        assert_eq!(classify_key("userEmail"), Some(FieldKind::Email));
        assert_eq!(classify_key("telephone"), Some(FieldKind::Phone));
        assert_eq!(classify_key("first_name"), Some(FieldKind::Name));
        assert_eq!(classify_key("client_id"), Some(FieldKind::Identifier));
        assert_eq!(classify_key("advertiser"), Some(FieldKind::Organization));
        assert_eq!(classify_key("count"), None);
    }

    #[test]
    fn test_scrub_json_keeps_shape() {
        let cfg = PoisonConfig::default();
        let body = r#"{"email":"me@real.com","items":[{"sku":"A1","brand":"Acme"}],"count":3,"tags":["x"]}"#;
        let out = scrub_json_body(body, &cfg, &mut Mulberry32::new(4)).unwrap();
        let v: Value = serde_json::from_str(&out).unwrap();
        assert_ne!(v["email"], "me@real.com");
        assert_eq!(v["count"], 3);
        assert_eq!(v["tags"], json!(["x"]));
        assert_eq!(v["items"][0]["sku"], "A1");
        let brand = v["items"][0]["brand"].as_str().unwrap();
        assert!(DEFAULT_DEFUNCT_NAMES.contains(&brand));
        assert!(scrub_json_body("not json", &cfg, &mut Mulberry32::new(4)).is_none());
    }

    #[test]
    fn test_custom_defunct_names() {
        let cfg = PoisonConfig {
            defunct_names: vec!["  Enron ".into(), "".into()],
            ..PoisonConfig::default()
        };
        assert_eq!(fake_defunct(&cfg, &mut Mulberry32::new(5)), "Enron");
    }

    #[test]
    fn test_fake_uuid_shape() {
        let id = fake_uuid(&mut Mulberry32::new(6));
        let groups: Vec<usize> = id.split('-').map(str::len).collect();
        assert_eq!(groups, vec![8, 4, 4, 4, 12]);
    }
}
