//! Response Normalizer: coerces raw model output into the exact schema shape.
//!
//! Policy:
//! - A single leading/trailing code fence is stripped; anything else that is
//!   not one JSON object is `MalformedOutput`.
//! - Absent or type-incompatible fields take their schema default.
//! - Unknown keys are dropped.
//! - List elements that are not objects, or lack a required field, are
//!   dropped individually.
//! - Only a missing or blank required field outside a list is fatal.
//!
//! Every lenient drop is recorded as a `NormalizationWarning`.

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::schema::{Field, FieldKind, ResumeRecord, Schema};

static NULL: Value = Value::Null;

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("model output is not a single JSON object: {0}")]
    MalformedOutput(String),

    #[error("required field '{field}' is {reason}")]
    SchemaViolation { field: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NormalizationWarning {
    /// A key the schema does not declare.
    UnknownKeyDropped { path: String },
    /// A list element removed from an object list or a string list.
    ElementDropped {
        path: String,
        index: usize,
        reason: String,
    },
    /// A present value of the wrong type, replaced by the field default.
    FieldDefaulted { path: String, found: &'static str },
}

#[derive(Debug, Clone)]
pub struct Normalized {
    pub record: ResumeRecord,
    pub warnings: Vec<NormalizationWarning>,
}

impl Normalized {
    pub fn dropped_elements(&self) -> usize {
        self.warnings
            .iter()
            .filter(|w| matches!(w, NormalizationWarning::ElementDropped { .. }))
            .count()
    }
}

/// Normalizes model output into a typed `ResumeRecord`. `schema` must be
/// `RESUME_SCHEMA` (or a compatible extension of it).
pub fn normalize(raw_text: &str, schema: &Schema) -> Result<Normalized, NormalizeError> {
    let (value, warnings) = normalize_value(raw_text, schema)?;
    let record = serde_json::from_value(value).map_err(|e| NormalizeError::SchemaViolation {
        field: "<record>".to_string(),
        reason: format!("not representable: {e}"),
    })?;
    Ok(Normalized { record, warnings })
}

/// Schema-generic normalization returning the conforming JSON tree.
pub fn normalize_value(
    raw_text: &str,
    schema: &Schema,
) -> Result<(Value, Vec<NormalizationWarning>), NormalizeError> {
    let json = strip_code_fence(raw_text);
    let parsed: Value = serde_json::from_str(json)
        .map_err(|e| NormalizeError::MalformedOutput(format!("invalid JSON ({e})")))?;
    let root = match parsed {
        Value::Object(map) => map,
        other => {
            return Err(NormalizeError::MalformedOutput(format!(
                "top-level value is {}",
                type_name(&other)
            )))
        }
    };

    let mut walker = Walker::default();
    let record = walker
        .object(schema.fields, Some(&root), "")
        .map_err(|missing| NormalizeError::SchemaViolation {
            field: missing.path,
            reason: missing.reason.to_string(),
        })?;
    Ok((Value::Object(record), walker.warnings))
}

/// Strips one ```` ```json ... ``` ```` (or bare ```` ``` ````) wrapper.
pub fn strip_code_fence(text: &str) -> &str {
    let text = text.trim();
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Skip a language tag such as `json` or `JSON`.
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

struct MissingRequired {
    path: String,
    reason: &'static str,
}

#[derive(Default)]
struct Walker {
    warnings: Vec<NormalizationWarning>,
}

impl Walker {
    fn object(
        &mut self,
        fields: &[Field],
        source: Option<&Map<String, Value>>,
        path: &str,
    ) -> Result<Map<String, Value>, MissingRequired> {
        let mut out = Map::new();
        for field in fields {
            let field_path = join(path, field.name);
            let value = source.and_then(|s| s.get(field.name));
            let normalized = self.field(field, value, &field_path)?;
            out.insert(field.name.to_string(), normalized);
        }

        if let Some(source) = source {
            for key in source.keys() {
                if !fields.iter().any(|f| f.name == key) {
                    self.warnings.push(NormalizationWarning::UnknownKeyDropped {
                        path: join(path, key),
                    });
                }
            }
        }
        Ok(out)
    }

    fn field(
        &mut self,
        field: &Field,
        value: Option<&Value>,
        path: &str,
    ) -> Result<Value, MissingRequired> {
        let value = value.unwrap_or(&NULL);
        // `None` means absent: required fields fail, the rest take the
        // schema default.
        let normalized = match field.kind {
            FieldKind::Text | FieldKind::OptionalText => self.scalar(value, path).map(Value::String),
            FieldKind::OptionalUrl => self
                .scalar(value, path)
                .map(|url| Value::String(normalize_url(&url))),
            FieldKind::TextList => Some(self.text_list(value, path))
                .filter(|items| !items.is_empty())
                .map(Value::Array),
            // Nested objects are always walked so their required fields are checked.
            FieldKind::Object(fields) => {
                let source = match value {
                    Value::Object(map) => Some(map),
                    Value::Null => None,
                    other => {
                        self.defaulted(path, other);
                        None
                    }
                };
                Some(Value::Object(self.object(fields, source, path)?))
            }
            FieldKind::ObjectList(fields) => Some(self.object_list(fields, value, path))
                .filter(|items| !items.is_empty())
                .map(Value::Array),
        };

        match normalized {
            Some(value) => Ok(value),
            None if field.is_required() => Err(MissingRequired {
                path: path.to_string(),
                reason: if value.is_null() { "missing" } else { "empty" },
            }),
            None => Ok(field.default_value()),
        }
    }

    /// Reads a string slot. Numbers and booleans are stringified; blank
    /// strings count as absent.
    fn scalar(&mut self, value: &Value, path: &str) -> Option<String> {
        match value {
            Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Null => None,
            other => {
                self.defaulted(path, other);
                None
            }
        }
    }

    fn text_list(&mut self, value: &Value, path: &str) -> Vec<Value> {
        let items = match value {
            Value::Array(items) => items,
            Value::Null => return Vec::new(),
            Value::String(s) if s.trim().is_empty() => return Vec::new(),
            Value::String(s) => {
                return vec![Value::String(s.trim().to_string())]
            }
            other => {
                self.defaulted(path, other);
                return Vec::new();
            }
        };

        let mut out = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            match list_item_text(item) {
                Some(text) => out.push(Value::String(text)),
                None => {
                    let reason = match item {
                        Value::Null => "null element".to_string(),
                        Value::String(_) => "blank string".to_string(),
                        other => format!("{} is not text", type_name(other)),
                    };
                    self.warnings.push(NormalizationWarning::ElementDropped {
                        path: path.to_string(),
                        index,
                        reason,
                    });
                }
            }
        }
        out
    }

    fn object_list(&mut self, fields: &[Field], value: &Value, path: &str) -> Vec<Value> {
        let items: Vec<&Value> = match value {
            Value::Array(items) => items.iter().collect(),
            Value::Null => return Vec::new(),
            // A lone object where a list was expected.
            Value::Object(_) => vec![value],
            other => {
                self.defaulted(path, other);
                return Vec::new();
            }
        };

        let mut out = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            let element_path = format!("{path}[{index}]");
            let Value::Object(map) = item else {
                self.warnings.push(NormalizationWarning::ElementDropped {
                    path: path.to_string(),
                    index,
                    reason: format!("{} is not an object", type_name(item)),
                });
                continue;
            };

            // Warnings from inside a dropped element are replaced by the drop.
            let mark = self.warnings.len();
            match self.object(fields, Some(map), &element_path) {
                Ok(element) => out.push(Value::Object(element)),
                Err(missing) => {
                    self.warnings.truncate(mark);
                    self.warnings.push(NormalizationWarning::ElementDropped {
                        path: path.to_string(),
                        index,
                        reason: format!("required field '{}' is {}", missing.path, missing.reason),
                    });
                }
            }
        }
        out
    }

    fn defaulted(&mut self, path: &str, found: &Value) {
        self.warnings.push(NormalizationWarning::FieldDefaulted {
            path: path.to_string(),
            found: type_name(found),
        });
    }
}

/// Text for one string-list element. Objects collapse to
/// `"name - description"` or whichever of the two is present.
fn list_item_text(item: &Value) -> Option<String> {
    match item {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Object(map) => {
            let part = |key: &str| {
                map.get(key)
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
            };
            match (part("name"), part("description")) {
                (Some(name), Some(description)) => Some(format!("{name} - {description}")),
                (Some(one), None) | (None, Some(one)) => Some(one.to_string()),
                (None, None) => None,
            }
        }
        _ => None,
    }
}

/// Adds `https://` to scheme-less links. Links already carrying a scheme are
/// kept as-is.
pub fn normalize_url(url: &str) -> String {
    let lower = url.to_ascii_lowercase();
    if ["http://", "https://", "ftp://"].iter().any(|s| lower.starts_with(s)) {
        url.to_string()
    } else if let Some(rest) = url.strip_prefix("//") {
        format!("https://{rest}")
    } else {
        format!("https://{url}")
    }
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::RESUME_SCHEMA;
    use serde_json::json;

    fn full_output() -> Value {
        json!({
            "personal_information": {
                "full_name": "Jane Doe",
                "email": "jane@example.com",
                "phone": "+1 555 0100",
                "location": "Berlin",
                "social_links": {
                    "linkedin": "https://linkedin.com/in/janedoe",
                    "github": "github.com/janedoe",
                    "portfolio": null
                }
            },
            "professional_summary": "Backend engineer.",
            "education": [
                {"degree": "BSc Computer Science", "institution": "TU Berlin",
                 "start_date": "2012", "end_date": "2016", "gpa": 3.8}
            ],
            "work_experience": [
                {"company": "Acme", "job_title": "Engineer", "start_date": "2016",
                 "end_date": "Present", "description": "Built APIs",
                 "achievements": ["Cut latency 40%"]}
            ],
            "skills": {
                "technical_skills": ["Rust", "Go"],
                "tools_and_technologies": ["Docker"],
                "soft_skills": []
            },
            "projects": [
                {"project_name": "Parser", "description": null, "technologies_used": ["Rust"]}
            ],
            "additional_information": {
                "certifications": [],
                "languages": ["English", "German"],
                "awards": []
            }
        })
    }

    #[test]
    fn test_minimal_output_is_filled_with_defaults() {
        let out = normalize(r#"{"personal_information": {"full_name": "Jane Doe"}}"#, &RESUME_SCHEMA)
            .unwrap();
        let record = out.record;
        assert_eq!(record.personal_information.full_name, "Jane Doe");
        assert_eq!(record.personal_information.email, None);
        assert_eq!(record.professional_summary, None);
        assert!(record.education.is_empty());
        assert!(record.work_experience.is_empty());
        assert!(record.skills.technical_skills.is_empty());
        assert_eq!(record.personal_information.social_links.linkedin, None);
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn test_missing_full_name_is_schema_violation() {
        let err = normalize(r#"{"personal_information": {"email": "a@b.c"}}"#, &RESUME_SCHEMA)
            .unwrap_err();
        match err {
            NormalizeError::SchemaViolation { field, reason } => {
                assert_eq!(field, "personal_information.full_name");
                assert_eq!(reason, "missing");
            }
            other => panic!("expected SchemaViolation, got {other:?}"),
        }
    }

    #[test]
    fn test_blank_full_name_is_schema_violation() {
        let err = normalize(r#"{"personal_information": {"full_name": "   "}}"#, &RESUME_SCHEMA)
            .unwrap_err();
        assert!(matches!(err, NormalizeError::SchemaViolation { ref reason, .. } if reason == "empty"));
    }

    #[test]
    fn test_missing_personal_information_is_schema_violation() {
        let err = normalize(r#"{"education": []}"#, &RESUME_SCHEMA).unwrap_err();
        assert!(matches!(err, NormalizeError::SchemaViolation { .. }));
    }

    #[test]
    fn test_code_fenced_output_is_accepted() {
        let raw = "```json\n{\"personal_information\": {\"full_name\": \"Jane Doe\"}}\n```";
        let out = normalize(raw, &RESUME_SCHEMA).unwrap();
        assert_eq!(out.record.personal_information.full_name, "Jane Doe");
    }

    #[test]
    fn test_strip_code_fence_variants() {
        assert_eq!(strip_code_fence("```json\n{\"key\": \"value\"}\n```"), "{\"key\": \"value\"}");
        assert_eq!(strip_code_fence("```\n{\"key\": \"value\"}\n```"), "{\"key\": \"value\"}");
        assert_eq!(strip_code_fence("```JSON {\"key\": 1}```"), "{\"key\": 1}");
        assert_eq!(strip_code_fence("  {\"key\": \"value\"}  "), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_prose_wrapped_output_is_malformed() {
        let raw = "Here is the JSON: {\"personal_information\": {\"full_name\": \"Jane\"}}";
        let err = normalize(raw, &RESUME_SCHEMA).unwrap_err();
        assert!(matches!(err, NormalizeError::MalformedOutput(_)));
        assert!(!err.to_string().contains("Here is the JSON"));
    }

    #[test]
    fn test_top_level_array_is_malformed() {
        let err = normalize("[1, 2]", &RESUME_SCHEMA).unwrap_err();
        assert!(matches!(err, NormalizeError::MalformedOutput(ref m) if m.contains("an array")));
    }

    #[test]
    fn test_normalize_is_idempotent_on_conforming_record() {
        let first = normalize(&full_output().to_string(), &RESUME_SCHEMA).unwrap();
        let serialized = serde_json::to_string(&first.record).unwrap();
        let second = normalize(&serialized, &RESUME_SCHEMA).unwrap();
        assert_eq!(first.record, second.record);
        assert!(second.warnings.is_empty());
        assert_eq!(serialized, serde_json::to_string(&second.record).unwrap());
    }

    #[test]
    fn test_unknown_keys_are_dropped_with_warning() {
        let mut output = full_output();
        output["hobbies"] = json!(["chess"]);
        output["skills"]["languages"] = json!(["Rust"]);
        let out = normalize(&output.to_string(), &RESUME_SCHEMA).unwrap();

        let serialized = serde_json::to_value(&out.record).unwrap();
        assert!(serialized.get("hobbies").is_none());
        assert!(serialized["skills"].get("languages").is_none());
        assert_eq!(
            out.warnings,
            vec![
                NormalizationWarning::UnknownKeyDropped {
                    path: "skills.languages".to_string()
                },
                NormalizationWarning::UnknownKeyDropped {
                    path: "hobbies".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_malformed_list_elements_are_dropped_and_counted() {
        let mut output = full_output();
        output["work_experience"] = json!([
            {"company": "Acme", "job_title": "Engineer", "extra": true},
            {"company": "NoTitle Inc"},
            "Freelance 2015",
            {"company": "Globex", "job_title": "Lead"}
        ]);
        let out = normalize(&output.to_string(), &RESUME_SCHEMA).unwrap();

        let companies: Vec<_> = out
            .record
            .work_experience
            .iter()
            .map(|w| w.company.as_str())
            .collect();
        assert_eq!(companies, vec!["Acme", "Globex"]);
        assert_eq!(out.dropped_elements(), 2);
        assert!(out.warnings.contains(&NormalizationWarning::ElementDropped {
            path: "work_experience".to_string(),
            index: 1,
            reason: "required field 'work_experience[1].job_title' is missing".to_string(),
        }));
        assert!(out.warnings.contains(&NormalizationWarning::UnknownKeyDropped {
            path: "work_experience[0].extra".to_string()
        }));
    }

    #[test]
    fn test_scalars_and_urls_are_coerced() {
        let out = normalize(&full_output().to_string(), &RESUME_SCHEMA).unwrap();
        assert_eq!(out.record.education[0].gpa.as_deref(), Some("3.8"));
        assert_eq!(
            out.record.personal_information.social_links.github.as_deref(),
            Some("https://github.com/janedoe")
        );
        assert_eq!(
            out.record.personal_information.social_links.linkedin.as_deref(),
            Some("https://linkedin.com/in/janedoe")
        );
    }

    #[test]
    fn test_objects_in_string_lists_collapse() {
        let mut output = full_output();
        output["additional_information"]["awards"] = json!([
            {"name": "Hackathon winner", "description": "1st of 80 teams"},
            {"name": "Dean's list"},
            {"year": 2020},
            ["nested"]
        ]);
        let out = normalize(&output.to_string(), &RESUME_SCHEMA).unwrap();
        assert_eq!(
            out.record.additional_information.awards,
            vec!["Hackathon winner - 1st of 80 teams", "Dean's list"]
        );
        assert_eq!(out.dropped_elements(), 2);
    }

    #[test]
    fn test_null_and_blank_list_elements_are_reported() {
        let mut output = full_output();
        output["skills"]["technical_skills"] = json!(["Rust", null, "  ", "Go"]);
        let out = normalize(&output.to_string(), &RESUME_SCHEMA).unwrap();
        assert_eq!(out.record.skills.technical_skills, vec!["Rust", "Go"]);
        assert_eq!(
            out.warnings,
            vec![
                NormalizationWarning::ElementDropped {
                    path: "skills.technical_skills".to_string(),
                    index: 1,
                    reason: "null element".to_string(),
                },
                NormalizationWarning::ElementDropped {
                    path: "skills.technical_skills".to_string(),
                    index: 2,
                    reason: "blank string".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_absent_fields_take_schema_defaults() {
        let (value, _) = normalize_value(
            r#"{"personal_information": {"full_name": "Jane Doe"}, "education": "n/a"}"#,
            &RESUME_SCHEMA,
        )
        .unwrap();
        for field in RESUME_SCHEMA.fields {
            if field.name != "personal_information" {
                assert_eq!(value[field.name], field.default_value(), "{}", field.name);
            }
        }
    }

    #[test]
    fn test_flat_skills_list_is_defaulted_with_warning() {
        let mut output = full_output();
        output["skills"] = json!(["Rust", "Go"]);
        let out = normalize(&output.to_string(), &RESUME_SCHEMA).unwrap();
        assert!(out.record.skills.technical_skills.is_empty());
        assert_eq!(
            out.warnings,
            vec![NormalizationWarning::FieldDefaulted {
                path: "skills".to_string(),
                found: "an array"
            }]
        );
    }

    #[test]
    fn test_lone_object_for_list_is_wrapped() {
        let mut output = full_output();
        output["projects"] = json!({"project_name": "Solo"});
        let out = normalize(&output.to_string(), &RESUME_SCHEMA).unwrap();
        assert_eq!(out.record.projects.len(), 1);
        assert_eq!(out.record.projects[0].project_name, "Solo");
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(normalize_url("linkedin.com/in/x"), "https://linkedin.com/in/x");
        assert_eq!(normalize_url("HTTP://example.com"), "HTTP://example.com");
        assert_eq!(normalize_url("//cdn.example.com"), "https://cdn.example.com");
        assert_eq!(normalize_url("ftp://files.example.com"), "ftp://files.example.com");
    }

    #[test]
    fn test_warnings_serialize_with_kind_tag() {
        let warning = NormalizationWarning::ElementDropped {
            path: "education".to_string(),
            index: 0,
            reason: "a string is not an object".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&warning).unwrap(),
            json!({"kind": "element_dropped", "path": "education", "index": 0,
                   "reason": "a string is not an object"})
        );
    }
}
