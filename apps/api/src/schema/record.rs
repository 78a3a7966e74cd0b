//! Typed form of a normalized resume. Field names and order follow
//! `RESUME_SCHEMA` exactly.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeRecord {
    pub personal_information: PersonalInformation,
    pub professional_summary: Option<String>,
    pub education: Vec<Education>,
    pub work_experience: Vec<WorkExperience>,
    pub skills: Skills,
    pub projects: Vec<Project>,
    pub additional_information: AdditionalInformation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonalInformation {
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub location: Option<String>,
    pub social_links: SocialLinks,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SocialLinks {
    pub linkedin: Option<String>,
    pub github: Option<String>,
    pub portfolio: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Education {
    pub degree: String,
    pub institution: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub gpa: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkExperience {
    pub company: String,
    pub job_title: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub description: Option<String>,
    pub achievements: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Skills {
    pub technical_skills: Vec<String>,
    pub tools_and_technologies: Vec<String>,
    pub soft_skills: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub project_name: String,
    pub description: Option<String>,
    pub technologies_used: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdditionalInformation {
    pub certifications: Vec<String>,
    pub languages: Vec<String>,
    pub awards: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::RESUME_SCHEMA;
    use serde_json::Value;

    fn sample() -> ResumeRecord {
        ResumeRecord {
            personal_information: PersonalInformation {
                full_name: "Jane Doe".to_string(),
                email: None,
                phone: None,
                location: None,
                social_links: SocialLinks::default(),
            },
            professional_summary: None,
            education: vec![Education {
                degree: "BSc".to_string(),
                institution: "MIT".to_string(),
                start_date: None,
                end_date: None,
                gpa: None,
            }],
            work_experience: vec![WorkExperience {
                company: "Acme".to_string(),
                job_title: "Engineer".to_string(),
                start_date: None,
                end_date: None,
                description: None,
                achievements: vec![],
            }],
            skills: Skills::default(),
            projects: vec![Project {
                project_name: "Parser".to_string(),
                description: None,
                technologies_used: vec![],
            }],
            additional_information: AdditionalInformation::default(),
        }
    }

    /// Recursively compares object keys (in order) between two JSON values.
    fn assert_same_shape(typed: &Value, schema: &Value, path: &str) {
        match (typed, schema) {
            (Value::Object(a), Value::Object(b)) => {
                let a_keys: Vec<_> = a.keys().collect();
                let b_keys: Vec<_> = b.keys().collect();
                assert_eq!(a_keys, b_keys, "key mismatch at '{path}'");
                for (key, value) in a {
                    assert_same_shape(value, &b[key], &format!("{path}.{key}"));
                }
            }
            (Value::Array(a), Value::Array(b)) => {
                if let (Some(x), Some(y)) = (a.first(), b.first()) {
                    assert_same_shape(x, y, &format!("{path}[]"));
                }
            }
            _ => {}
        }
    }

    #[test]
    fn test_typed_record_matches_schema_tree() {
        let typed = serde_json::to_value(sample()).unwrap();
        assert_same_shape(&typed, &RESUME_SCHEMA.example(), "");
    }
}
