//! Declarative form validation.
//!
//! A `Schema` is an ordered list of fields, each with a `FieldRule`: whether
//! the field is required, a list of tagged `Rule`s, and the message shown
//! when a rule fails. Rules are plain data, so schemas can be serialized,
//! compared and loaded from fixtures.
//!
//! `validate` runs every field in declared order and never stops early. A
//! required field that is missing, empty or blank gets `"<field> is
//! required"` and no further checks. A present value is checked against the
//! field's rules with access to the whole form (for cross-field rules); the
//! first failing rule records the schema message.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_MAX_FILE_MB: u64 = 8;
pub const DEFAULT_ALLOWED_TYPES: [&str; 3] = ["image/jpeg", "image/png", "application/pdf"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Rule {
    Email,
    /// At least 8 characters from `[A-Za-z0-9@$!%*?&]` with a lowercase
    /// letter, an uppercase letter and a digit.
    StrongPassword,
    Phone,
    MinLength { min: usize },
    MaxLength { max: usize },
    Number,
    PositiveNumber,
    OneOf { options: Vec<String> },
    Pattern { regex: String },
    /// Equal to the value of another field of the same form.
    MatchesField { field: String },
    NonEmptyList,
    /// A date or timestamp strictly later than `instant`.
    After { instant: DateTime<Utc> },
    /// A caller-registered predicate, looked up by name in `Predicates`.
    Custom { name: String },
}

/// `(value, form) -> valid`
pub type Predicate = fn(&Value, &Value) -> bool;

/// Named predicates available to `Rule::Custom`.
#[derive(Debug, Clone, Default)]
pub struct Predicates {
    by_name: BTreeMap<String, Predicate>,
}

impl Predicates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, name: impl Into<String>, predicate: Predicate) -> Self {
        self.by_name.insert(name.into(), predicate);
        self
    }
}

/// Patterns compiled during one validation pass, keyed by source.
#[derive(Default)]
struct CompiledPatterns {
    by_source: HashMap<String, Option<Regex>>,
}

impl CompiledPatterns {
    fn get(&mut self, source: &str) -> Option<&Regex> {
        self.by_source
            .entry(source.to_string())
            .or_insert_with(|| {
                Regex::new(source)
                    .inspect_err(|e| tracing::warn!(regex = %source, error = %e, "invalid validation pattern"))
                    .ok()
            })
            .as_ref()
    }
}

impl Rule {
    fn check(&self, value: &Value, form: &Value, predicates: &Predicates, patterns: &mut CompiledPatterns) -> bool {
        match self {
            Rule::Email => text(value).is_some_and(|s| is_email(&s)),
            Rule::StrongPassword => text(value).is_some_and(|s| is_strong_password(&s)),
            Rule::Phone => text(value).is_some_and(|s| is_phone(&s)),
            Rule::MinLength { min } => length(value).is_some_and(|len| len >= *min),
            Rule::MaxLength { max } => length(value).is_some_and(|len| len <= *max),
            Rule::Number => number(value).is_some(),
            Rule::PositiveNumber => number(value).is_some_and(|n| n > 0.0),
            Rule::OneOf { options } => text(value).is_some_and(|s| options.iter().any(|o| *o == s)),
            Rule::Pattern { regex } => match patterns.get(regex) {
                Some(re) => text(value).is_some_and(|s| re.is_match(&s)),
                None => false,
            },
            Rule::MatchesField { field } => form.get(field) == Some(value),
            Rule::NonEmptyList => match value {
                Value::Array(items) => !items.is_empty(),
                other => text(other).is_some_and(|s| !s.is_empty()),
            },
            Rule::After { instant } => text(value)
                .and_then(|s| parse_instant(&s))
                .is_some_and(|at| at > *instant),
            Rule::Custom { name } => match predicates.by_name.get(name) {
                Some(predicate) => predicate(value, form),
                None => {
                    tracing::warn!(%name, "unregistered validation predicate");
                    false
                }
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRule {
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub rules: Vec<Rule>,
    pub message: String,
}

impl FieldRule {
    pub fn required(message: impl Into<String>) -> Self {
        Self {
            required: true,
            rules: Vec::new(),
            message: message.into(),
        }
    }

    pub fn optional(message: impl Into<String>) -> Self {
        Self {
            required: false,
            rules: Vec::new(),
            message: message.into(),
        }
    }

    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,
    #[serde(flatten)]
    pub rule: FieldRule,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub fields: Vec<SchemaField>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, rule: FieldRule) -> Self {
        self.fields.push(SchemaField {
            name: name.into(),
            rule,
        });
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: BTreeMap<String, String>,
}

impl ValidationResult {
    pub fn error(&self, field: &str) -> Option<&str> {
        self.errors.get(field).map(String::as_str)
    }
}

/// Apply `schema` to `form`, a JSON object of field values.
pub fn validate(form: &Value, schema: &Schema) -> ValidationResult {
    validate_with(form, schema, &Predicates::default())
}

/// Like `validate`, resolving `Rule::Custom` against `predicates`.
pub fn validate_with(form: &Value, schema: &Schema, predicates: &Predicates) -> ValidationResult {
    let mut errors = BTreeMap::new();
    let mut patterns = CompiledPatterns::default();

    for SchemaField { name, rule } in &schema.fields {
        let value = form.get(name);

        if rule.required && is_blank(value) {
            errors.insert(name.clone(), format!("{name} is required"));
            continue;
        }

        let Some(value) = value.filter(|v| is_present(v)) else {
            continue;
        };
        if rule.rules.iter().any(|r| !r.check(value, form, predicates, &mut patterns)) {
            errors.insert(name.clone(), rule.message.clone());
        }
    }

    ValidationResult {
        is_valid: errors.is_empty(),
        errors,
    }
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(_) => false,
    }
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        _ => true,
    }
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn length(value: &Value) -> Option<usize> {
    match value {
        Value::Array(items) => Some(items.len()),
        other => text(other).map(|s| s.chars().count()),
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

fn is_email(s: &str) -> bool {
    static EMAIL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"));
    EMAIL.is_match(s)
}

// The password rule needs lookahead, which `regex` does not support.
fn is_strong_password(s: &str) -> bool {
    s.chars().count() >= 8
        && s.chars().all(|c| c.is_ascii_alphanumeric() || "@$!%*?&".contains(c))
        && s.chars().any(|c| c.is_ascii_lowercase())
        && s.chars().any(|c| c.is_ascii_uppercase())
        && s.chars().any(|c| c.is_ascii_digit())
}

fn is_phone(s: &str) -> bool {
    static PHONE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\+?[1-9][0-9]{0,15}$").expect("valid phone regex"));
    let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    PHONE.is_match(&compact)
}

fn parse_instant(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(s) {
        return Some(at.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Whether a file of `bytes` fits under `max_mb` mebibytes.
pub fn file_size_ok(bytes: u64, max_mb: u64) -> bool {
    bytes <= max_mb.saturating_mul(1024 * 1024)
}

pub fn file_type_ok(content_type: &str, allowed: &[String]) -> bool {
    allowed.iter().any(|t| t.eq_ignore_ascii_case(content_type))
}

// ---------------------------------------------------------------------------
// Built-in schemas
// ---------------------------------------------------------------------------

const EMAIL_MESSAGE: &str = "Please enter a valid email address";

pub fn login_schema() -> Schema {
    Schema::new()
        .field("email", FieldRule::required(EMAIL_MESSAGE).rule(Rule::Email))
        .field(
            "password",
            FieldRule::required("Password is required").rule(Rule::MinLength { min: 1 }),
        )
}

pub fn register_schema() -> Schema {
    Schema::new()
        .field(
            "firstName",
            FieldRule::required("First name must be at least 2 characters").rule(Rule::MinLength { min: 2 }),
        )
        .field(
            "lastName",
            FieldRule::required("Last name must be at least 2 characters").rule(Rule::MinLength { min: 2 }),
        )
        .field("email", FieldRule::required(EMAIL_MESSAGE).rule(Rule::Email))
        .field(
            "password",
            FieldRule::required("Password must be at least 8 characters with uppercase, lowercase, and number")
                .rule(Rule::StrongPassword),
        )
        .field(
            "confirmPassword",
            FieldRule::required("Passwords do not match").rule(Rule::MatchesField {
                field: "password".to_string(),
            }),
        )
        .field(
            "role",
            FieldRule::required("Please select a valid role").rule(Rule::OneOf {
                options: vec!["REQUESTER".to_string(), "TASKER".to_string()],
            }),
        )
}

/// Job creation form; the deadline must fall after `now`.
pub fn job_create_schema(now: DateTime<Utc>) -> Schema {
    Schema::new()
        .field(
            "title",
            FieldRule::required("Title must be at least 5 characters").rule(Rule::MinLength { min: 5 }),
        )
        .field(
            "description",
            FieldRule::required("Description must be at least 20 characters").rule(Rule::MinLength { min: 20 }),
        )
        .field(
            "budget",
            FieldRule::required("Budget must be a positive number").rule(Rule::PositiveNumber),
        )
        .field(
            "deadline",
            FieldRule::required("Deadline must be in the future").rule(Rule::After { instant: now }),
        )
        .field(
            "skills",
            FieldRule::required("Please select at least one skill").rule(Rule::NonEmptyList),
        )
}

pub fn profile_update_schema() -> Schema {
    Schema::new()
        .field(
            "firstName",
            FieldRule::required("First name must be at least 2 characters").rule(Rule::MinLength { min: 2 }),
        )
        .field(
            "lastName",
            FieldRule::required("Last name must be at least 2 characters").rule(Rule::MinLength { min: 2 }),
        )
        .field("email", FieldRule::required(EMAIL_MESSAGE).rule(Rule::Email))
        .field(
            "phone",
            FieldRule::optional("Please enter a valid phone number").rule(Rule::Phone),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;
    use serde_json::json;

    #[test]
    fn missing_password_reports_required() {
        let result = validate(&json!({"email": "a@b.com", "password": ""}), &login_schema());
        assert!(!result.is_valid);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.error("password"), Some("password is required"));
    }

    #[test]
    fn every_field_is_evaluated() {
        let result = validate(&json!({}), &register_schema());
        assert_eq!(result.errors.len(), 6);
        assert_eq!(result.error("confirmPassword"), Some("confirmPassword is required"));
    }

    #[test]
    fn blank_required_value_is_missing() {
        let result = validate(&json!({"email": "   ", "password": "x"}), &login_schema());
        assert_eq!(result.error("email"), Some("email is required"));
    }

    #[test]
    fn confirm_password_must_match() {
        let form = json!({
            "firstName": "Ada",
            "lastName": "Byron",
            "email": "ada@promin.com",
            "password": "Secret123",
            "confirmPassword": "Secret124",
            "role": "TASKER"
        });
        let result = validate(&form, &register_schema());
        assert!(!result.is_valid);
        assert_eq!(result.error("confirmPassword"), Some("Passwords do not match"));
        assert_eq!(result.errors.len(), 1);
    }

    #[test]
    fn admin_role_cannot_self_register() {
        let form = json!({
            "firstName": "Ada",
            "lastName": "Byron",
            "email": "ada@promin.com",
            "password": "Secret123",
            "confirmPassword": "Secret123",
            "role": "ADMIN"
        });
        assert_eq!(
            validate(&form, &register_schema()).error("role"),
            Some("Please select a valid role")
        );
    }

    #[test]
    fn optional_field_absent_is_valid() {
        let form = json!({"firstName": "Ada", "lastName": "Byron", "email": "ada@promin.com"});
        let result = validate(&form, &profile_update_schema());
        assert!(result.is_valid);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn optional_field_present_is_checked() {
        let form = json!({"firstName": "Ada", "lastName": "Byron", "email": "ada@promin.com", "phone": "0123"});
        assert_eq!(
            validate(&form, &profile_update_schema()).error("phone"),
            Some("Please enter a valid phone number")
        );
    }

    #[test]
    fn job_deadline_must_follow_now() {
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap();
        let base = json!({
            "title": "Design a logo",
            "description": "A clean vector logo for a bakery brand.",
            "budget": "150",
            "skills": ["design"]
        });

        let mut form = base.clone();
        form["deadline"] = json!("2026-10-15");
        assert_eq!(
            validate(&form, &job_create_schema(now)).error("deadline"),
            Some("Deadline must be in the future")
        );

        form["deadline"] = json!("2026-11-01T09:30");
        assert!(validate(&form, &job_create_schema(now)).is_valid);
    }

    #[test]
    fn empty_skill_list_is_required() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let form = json!({"skills": []});
        assert_eq!(
            validate(&form, &job_create_schema(now)).error("skills"),
            Some("skills is required")
        );
    }

    #[test]
    fn validation_is_deterministic() {
        let form = json!({"email": "nope", "password": "pw"});
        assert_eq!(validate(&form, &login_schema()), validate(&form, &login_schema()));
    }

    #[test]
    fn invalid_pattern_fails_the_field() {
        let schema = Schema::new().field(
            "code",
            FieldRule::required("Bad code").rule(Rule::Pattern {
                regex: "([".to_string(),
            }),
        );
        assert_eq!(validate(&json!({"code": "x"}), &schema).error("code"), Some("Bad code"));
    }

    #[test]
    fn pattern_is_compiled_once_per_pass() {
        let mut patterns = CompiledPatterns::default();
        let first = patterns.get("^[A-Z]{3}$").map(|re| re as *const Regex);
        let second = patterns.get("^[A-Z]{3}$").map(|re| re as *const Regex);
        assert!(first.is_some());
        assert_eq!(first, second);
        assert!(patterns.get("([").is_none());
        assert_eq!(patterns.by_source.len(), 2);

        let rule = FieldRule::required("Use three capitals").rule(Rule::Pattern {
            regex: "^[A-Z]{3}$".to_string(),
        });
        let schema = Schema::new().field("from", rule.clone()).field("to", rule);
        let result = validate(&json!({"from": "OSL", "to": "bgo"}), &schema);
        assert_eq!(result.error("from"), None);
        assert_eq!(result.error("to"), Some("Use three capitals"));
    }

    #[test]
    fn custom_predicates_are_resolved_by_name() {
        fn even(value: &Value, _: &Value) -> bool {
            value.as_u64().is_some_and(|n| n % 2 == 0)
        }
        let schema = Schema::new().field(
            "seats",
            FieldRule::required("Seats must be even").rule(Rule::Custom {
                name: "even".to_string(),
            }),
        );
        let predicates = Predicates::new().register("even", even);

        assert!(validate_with(&json!({"seats": 4}), &schema, &predicates).is_valid);
        assert_eq!(
            validate_with(&json!({"seats": 3}), &schema, &predicates).error("seats"),
            Some("Seats must be even")
        );
        // unregistered predicates fail closed
        assert!(!validate(&json!({"seats": 4}), &schema).is_valid);
    }

    #[test]
    fn schema_roundtrips_through_json() {
        let schema = register_schema();
        let json = serde_json::to_value(&schema).unwrap();
        assert_eq!(json["fields"][4]["rules"][0]["kind"], "matches_field");
        let back: Schema = serde_json::from_value(json).unwrap();
        assert_eq!(back, schema);
    }

    #[rstest]
    #[case("a@b.com", true)]
    #[case("first.last@promin.co.uk", true)]
    #[case("a@b", false)]
    #[case("a b@c.com", false)]
    #[case("@b.com", false)]
    #[case("a@@b.com", false)]
    #[case("a@b.", false)]
    fn email_rule(#[case] input: &str, #[case] ok: bool) {
        assert_eq!(is_email(input), ok);
    }

    #[rstest]
    #[case("Secret123", true)]
    #[case("secret123", false)]
    #[case("SECRET123", false)]
    #[case("Secret!!", false)]
    #[case("Sec1", false)]
    #[case("Secret 123", false)]
    fn strong_password_rule(#[case] input: &str, #[case] ok: bool) {
        assert_eq!(is_strong_password(input), ok);
    }

    #[rstest]
    #[case("+47 912 34 567", true)]
    #[case("5551234", true)]
    #[case("0123", false)]
    #[case("+", false)]
    #[case("12345678901234567", false)]
    fn phone_rule(#[case] input: &str, #[case] ok: bool) {
        assert_eq!(is_phone(input), ok);
    }

    #[rstest]
    #[case(json!("12.5"), true)]
    #[case(json!(3), true)]
    #[case(json!("0"), false)]
    #[case(json!("-4"), false)]
    #[case(json!("12abc"), false)]
    fn positive_number_rule(#[case] value: Value, #[case] ok: bool) {
        assert_eq!(Rule::PositiveNumber.check(&value, &json!({}), &Predicates::default(), &mut CompiledPatterns::default()), ok);
    }

    #[test]
    fn file_checks() {
        assert!(file_size_ok(8 * 1024 * 1024, DEFAULT_MAX_FILE_MB));
        assert!(!file_size_ok(8 * 1024 * 1024 + 1, DEFAULT_MAX_FILE_MB));
        let allowed: Vec<String> = DEFAULT_ALLOWED_TYPES.iter().map(|t| t.to_string()).collect();
        assert!(file_type_ok("application/pdf", &allowed));
        assert!(!file_type_ok("text/plain", &allowed));
    }
}
