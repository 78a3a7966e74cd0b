//! Schema Definition: the declarative shape of a parsed resume.
//!
//! The Prompt Builder renders its JSON example from this tree and the
//! Normalizer walks the same tree to coerce model output, so the two can
//! never disagree about field names or nesting. `ResumeRecord` is the typed
//! mirror of the tree; a test pins the two together.
//!
//! New optional fields may be appended freely. Renaming or removing a field
//! is a breaking change and requires bumping `SCHEMA_VERSION`.

pub mod record;

use serde_json::{Map, Value};

pub use record::ResumeRecord;

pub const SCHEMA_VERSION: &str = "2024-resume-v1";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldKind {
    /// Required string; absent or blank fails validation.
    Text,
    OptionalText,
    /// Optional string normalized to carry a URL scheme.
    OptionalUrl,
    TextList,
    Object(&'static [Field]),
    ObjectList(&'static [Field]),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Field {
    pub name: &'static str,
    pub kind: FieldKind,
}

impl Field {
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self { name, kind }
    }

    pub const fn required(name: &'static str) -> Self {
        Self::new(name, FieldKind::Text)
    }

    pub const fn optional(name: &'static str) -> Self {
        Self::new(name, FieldKind::OptionalText)
    }

    pub const fn url(name: &'static str) -> Self {
        Self::new(name, FieldKind::OptionalUrl)
    }

    pub const fn list(name: &'static str) -> Self {
        Self::new(name, FieldKind::TextList)
    }

    pub fn is_required(&self) -> bool {
        matches!(self.kind, FieldKind::Text)
    }

    /// The value used when the model omits this field: null for scalars,
    /// `[]` for lists, and an object of defaults for nested objects.
    pub fn default_value(&self) -> Value {
        match self.kind {
            FieldKind::Text | FieldKind::OptionalText | FieldKind::OptionalUrl => Value::Null,
            FieldKind::TextList | FieldKind::ObjectList(_) => Value::Array(Vec::new()),
            FieldKind::Object(fields) => defaults_object(fields),
        }
    }

    /// Example value for the prompt: like the default, but object lists
    /// carry one example element so the model sees the element shape.
    fn example_value(&self) -> Value {
        match self.kind {
            FieldKind::ObjectList(fields) => Value::Array(vec![example_object(fields)]),
            FieldKind::Object(fields) => example_object(fields),
            _ => self.default_value(),
        }
    }
}

#[derive(Debug)]
pub struct Schema {
    pub version: &'static str,
    pub fields: &'static [Field],
}

impl Schema {
    /// Fully-populated example of the target shape, in declaration order.
    pub fn example(&self) -> Value {
        example_object(self.fields)
    }

    /// Dotted paths of required fields, e.g. `education[].degree`.
    pub fn required_paths(&self) -> Vec<String> {
        let mut paths = Vec::new();
        collect_required(self.fields, "", &mut paths);
        paths
    }
}

fn defaults_object(fields: &[Field]) -> Value {
    Value::Object(
        fields
            .iter()
            .map(|f| (f.name.to_string(), f.default_value()))
            .collect::<Map<String, Value>>(),
    )
}

fn example_object(fields: &[Field]) -> Value {
    Value::Object(
        fields
            .iter()
            .map(|f| (f.name.to_string(), f.example_value()))
            .collect::<Map<String, Value>>(),
    )
}

fn collect_required(fields: &[Field], prefix: &str, out: &mut Vec<String>) {
    for field in fields {
        let path = if prefix.is_empty() {
            field.name.to_string()
        } else {
            format!("{prefix}.{}", field.name)
        };
        if field.is_required() {
            out.push(path);
            continue;
        }
        match field.kind {
            FieldKind::Object(nested) => collect_required(nested, &path, out),
            FieldKind::ObjectList(nested) => collect_required(nested, &format!("{path}[]"), out),
            _ => {}
        }
    }
}

const SOCIAL_LINKS: &[Field] = &[
    Field::url("linkedin"),
    Field::url("github"),
    Field::url("portfolio"),
];

const PERSONAL_INFORMATION: &[Field] = &[
    Field::required("full_name"),
    Field::optional("email"),
    Field::optional("phone"),
    Field::optional("location"),
    Field::new("social_links", FieldKind::Object(SOCIAL_LINKS)),
];

const EDUCATION: &[Field] = &[
    Field::required("degree"),
    Field::required("institution"),
    Field::optional("start_date"),
    Field::optional("end_date"),
    Field::optional("gpa"),
];

const WORK_EXPERIENCE: &[Field] = &[
    Field::required("company"),
    Field::required("job_title"),
    Field::optional("start_date"),
    Field::optional("end_date"),
    Field::optional("description"),
    Field::list("achievements"),
];

const SKILLS: &[Field] = &[
    Field::list("technical_skills"),
    Field::list("tools_and_technologies"),
    Field::list("soft_skills"),
];

const PROJECTS: &[Field] = &[
    Field::required("project_name"),
    Field::optional("description"),
    Field::list("technologies_used"),
];

const ADDITIONAL_INFORMATION: &[Field] = &[
    Field::list("certifications"),
    Field::list("languages"),
    Field::list("awards"),
];

/// The resume schema shared read-only by every request.
pub static RESUME_SCHEMA: Schema = Schema {
    version: SCHEMA_VERSION,
    fields: &[
        Field::new("personal_information", FieldKind::Object(PERSONAL_INFORMATION)),
        Field::optional("professional_summary"),
        Field::new("education", FieldKind::ObjectList(EDUCATION)),
        Field::new("work_experience", FieldKind::ObjectList(WORK_EXPERIENCE)),
        Field::new("skills", FieldKind::Object(SKILLS)),
        Field::new("projects", FieldKind::ObjectList(PROJECTS)),
        Field::new("additional_information", FieldKind::Object(ADDITIONAL_INFORMATION)),
    ],
};
