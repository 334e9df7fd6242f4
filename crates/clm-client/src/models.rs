//! Backend resource shapes
//!
//! Fields the backend may omit are `#[serde(default)]`. Status-like strings
//! become enums with an `Other` catch-all so a new backend state never
//! turns a whole list into a decode failure.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Backend identifiers arrive as UUID strings or integers.
pub type Id = String;

pub(crate) mod id_format {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Ok(match serde_json::Value::deserialize(d)? {
            serde_json::Value::String(s) => s,
            serde_json::Value::Number(n) => n.to_string(),
            serde_json::Value::Null => String::new(),
            other => other.to_string(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractStatus {
    #[default]
    Draft,
    Pending,
    Approved,
    Rejected,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    #[serde(deserialize_with = "id_format::deserialize")]
    pub id: Id,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub status: ContractStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

/// Writable contract fields for create/update.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ContractInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ContractStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

/// Draft created from already rendered text (AI editor output).
#[derive(Debug, Clone, Default, Serialize)]
pub struct ContractFromContent {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_type: Option<String>,
    pub rendered_text: String,
}

/// Inputs shared by template-driven generation and preview.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerationInputs {
    pub structured_inputs: BTreeMap<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub selected_clauses: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub custom_clauses: Vec<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContractGenerateResponse {
    pub contract: Value,
    #[serde(default)]
    pub version: Value,
    #[serde(default)]
    pub mandatory_clauses: Vec<Value>,
    #[serde(default)]
    pub clause_suggestions: BTreeMap<String, Value>,
    #[serde(default)]
    pub validation_errors: Vec<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContractFromFileResponse {
    #[serde(default)]
    pub contract: Value,
    #[serde(default)]
    pub rendered_text: String,
    #[serde(default)]
    pub raw_text: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContractPreview {
    #[serde(default)]
    pub rendered_text: String,
    #[serde(default)]
    pub raw_text: String,
    #[serde(default)]
    pub missing_fields: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ContractStatistics {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub draft: u64,
    #[serde(default)]
    pub pending: u64,
    #[serde(default)]
    pub approved: u64,
    #[serde(default)]
    pub rejected: u64,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Clause {
    #[serde(deserialize_with = "id_format::deserialize")]
    pub id: Id,
    #[serde(default)]
    pub clause_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    #[serde(default)]
    pub contract_type: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub is_mandatory: bool,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub tags: Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ContractTemplate {
    #[serde(deserialize_with = "id_format::deserialize")]
    pub id: Id,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub contract_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r2_key: Option<String>,
    #[serde(default)]
    pub merge_fields: Vec<String>,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TemplateInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge_fields: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Template text addressed by template type.
#[derive(Debug, Clone, Deserialize)]
pub struct TemplateFile {
    #[serde(default)]
    pub template_type: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Entry of the file-backed template library.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FileTemplate {
    #[serde(default, deserialize_with = "id_format::deserialize")]
    pub id: Id,
    pub filename: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub contract_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// Raw text of a file-backed template, `{{placeholders}}` included.
#[derive(Debug, Clone, Deserialize)]
pub struct FileTemplateContent {
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub template_type: String,
    pub content: String,
    #[serde(default)]
    pub size: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewFileTemplate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatedFileTemplate {
    pub template: FileTemplate,
}

/// Data-entry schema derived from a template's placeholders.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TemplateSchema {
    #[serde(default)]
    pub template_type: String,
    #[serde(default)]
    pub sections: Vec<TemplateSchemaSection>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TemplateSchemaSection {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub fields: Vec<TemplateSchemaField>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TemplateSchemaField {
    pub key: String,
    #[serde(default)]
    pub label: String,
    #[serde(default, rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub required: bool,
}

impl TemplateSchema {
    /// Keys of every required field across sections.
    pub fn required_keys(&self) -> Vec<&str> {
        self.sections
            .iter()
            .flat_map(|s| s.fields.iter())
            .filter(|f| f.required)
            .map(|f| f.key.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    #[default]
    Active,
    Inactive,
    Archived,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub step_number: u32,
    pub name: String,
    #[serde(default)]
    pub assigned_to: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    #[serde(deserialize_with = "id_format::deserialize")]
    pub id: Id,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub status: WorkflowStatus,
    #[serde(default)]
    pub steps: Vec<WorkflowStep>,
    #[serde(default)]
    pub created_at: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkflowInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<WorkflowStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub steps: Option<Vec<WorkflowStep>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    #[serde(deserialize_with = "id_format::deserialize")]
    pub id: Id,
    #[serde(default)]
    pub entity_type: String,
    #[serde(default, deserialize_with = "id_format::deserialize")]
    pub entity_id: Id,
    #[serde(default, deserialize_with = "id_format::deserialize")]
    pub requester_id: Id,
    #[serde(default)]
    pub status: ApprovalStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ApprovalInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ApprovalStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(deserialize_with = "id_format::deserialize")]
    pub id: Id,
    #[serde(default, rename = "type")]
    pub notification_type: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    #[serde(deserialize_with = "id_format::deserialize")]
    pub id: Id,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub entity_type: String,
    #[serde(default)]
    pub content_preview: String,
    #[serde(default)]
    pub relevance_score: f64,
}

/// Uploaded contract under AI review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewContract {
    #[serde(deserialize_with = "id_format::deserialize")]
    pub id: Id,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub original_filename: String,
    #[serde(default)]
    pub file_type: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub analysis: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

impl ReviewContract {
    /// Download name for a report: title (or original filename) with
    /// whitespace runs replaced by `_`, suffixed `_review.<ext>`.
    ///
    /// The result is always a single path component: separators, reserved
    /// and control characters become `_` and leading dots are dropped.
    pub fn report_filename(&self, format: ReportFormat) -> String {
        let base = [self.title.as_str(), self.original_filename.as_str()]
            .into_iter()
            .map(safe_file_stem)
            .find(|s| !s.is_empty())
            .unwrap_or_else(|| "contract_report".to_string());
        format!("{base}_review.{}", format.extension())
    }
}

fn safe_file_stem(raw: &str) -> String {
    let joined = raw
        .split_whitespace()
        .map(|word| {
            word.chars()
                .map(|c| match c {
                    '/' | '\\' | ':' | '<' | '>' | '"' | '|' | '?' | '*' => '_',
                    c if c.is_control() => '_',
                    c => c,
                })
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("_");
    joined.trim_start_matches('.').to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignedUrl {
    pub url: String,
}

/// Review report download formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Txt,
    Pdf,
}

impl ReportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ReportFormat::Txt => "txt",
            ReportFormat::Pdf => "pdf",
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Folder {
    #[serde(deserialize_with = "id_format::deserialize")]
    pub id: Id,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn contract_accepts_integer_id_and_unknown_status() {
        let contract: Contract = serde_json::from_value(json!({
            "id": 12,
            "title": "MSA",
            "status": "in_negotiation",
            "created_at": "2025-01-01T00:00:00Z",
            "updated_at": "2025-01-02T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(contract.id, "12");
        assert_eq!(contract.status, ContractStatus::Other);
    }

    #[test]
    fn contract_input_omits_unset_fields() {
        let input = ContractInput {
            title: Some("NDA".into()),
            ..Default::default()
        };
        assert_eq!(serde_json::to_value(input).unwrap(), json!({"title": "NDA"}));
    }

    #[test]
    fn schema_lists_required_keys() {
        let schema: TemplateSchema = serde_json::from_value(json!({
            "template_type": "NDA",
            "sections": [
                {"title": "Parties", "fields": [
                    {"key": "counterparty_name", "label": "Counterparty", "type": "text", "required": true},
                    {"key": "notes", "label": "Notes"}
                ]},
                {"title": "Term", "fields": [
                    {"key": "effective_date", "type": "date", "required": true}
                ]}
            ]
        }))
        .unwrap();
        assert_eq!(schema.required_keys(), vec!["counterparty_name", "effective_date"]);
    }

    #[test]
    fn report_filename_falls_back_to_original_filename() {
        let mut review: ReviewContract = serde_json::from_value(json!({
            "id": "r-1",
            "title": "  Master  Services Agreement ",
            "original_filename": "msa.pdf"
        }))
        .unwrap();
        assert_eq!(
            review.report_filename(ReportFormat::Pdf),
            "Master_Services_Agreement_review.pdf"
        );
        review.title.clear();
        assert_eq!(review.report_filename(ReportFormat::Txt), "msa.pdf_review.txt");
    }

    #[test]
    fn report_filename_is_a_single_safe_component() {
        let mut review: ReviewContract = serde_json::from_value(json!({
            "id": "r-2",
            "title": "../../.bashrc",
            "original_filename": "x.pdf"
        }))
        .unwrap();
        let name = review.report_filename(ReportFormat::Pdf);
        assert_eq!(name, "_.._.bashrc_review.pdf");
        assert_eq!(std::path::Path::new(&name).components().count(), 1);

        review.title = "a/b\\c:d\u{0007}".into();
        assert_eq!(review.report_filename(ReportFormat::Txt), "a_b_c_d__review.txt");

        review.title = "...".into();
        review.original_filename = "/".into();
        assert_eq!(review.report_filename(ReportFormat::Pdf), "__review.pdf");

        review.original_filename = "..".into();
        assert_eq!(
            review.report_filename(ReportFormat::Pdf),
            "contract_report_review.pdf"
        );
    }

    #[test]
    fn approval_status_serializes_lowercase() {
        let input = ApprovalInput {
            status: Some(ApprovalStatus::Approved),
            comment: Some("LGTM".into()),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(input).unwrap(),
            json!({"status": "approved", "comment": "LGTM"})
        );
    }
}
