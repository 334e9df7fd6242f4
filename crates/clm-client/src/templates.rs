//! Contract templates: database-backed records and the file-backed library

use serde_json::Value;

use crate::client::{ApiClient, RequestDescriptor, segment};
use crate::contracts::API_V1;
use crate::envelope::{ApiResponse, ListEnvelope};
use crate::models::{
    ContractTemplate, CreatedFileTemplate, FileTemplate, FileTemplateContent, NewFileTemplate,
    TemplateFile, TemplateInput, TemplateSchema,
};

impl ApiClient {
    pub async fn create_template(&self, input: &TemplateInput) -> ApiResponse<ContractTemplate> {
        self.send(RequestDescriptor::post(format!("{API_V1}/contract-templates/")).json(input))
            .await
    }

    pub async fn list_templates(&self) -> ApiResponse<ListEnvelope<ContractTemplate>> {
        self.send(RequestDescriptor::get(format!("{API_V1}/contract-templates/")))
            .await
    }

    pub async fn get_template(&self, id: &str) -> ApiResponse<ContractTemplate> {
        self.send(RequestDescriptor::get(format!(
            "{API_V1}/contract-templates/{}/",
            segment(id)
        )))
        .await
    }

    pub async fn update_template(
        &self,
        id: &str,
        input: &TemplateInput,
    ) -> ApiResponse<ContractTemplate> {
        self.send(
            RequestDescriptor::put(format!("{API_V1}/contract-templates/{}/", segment(id)))
                .json(input),
        )
        .await
    }

    pub async fn delete_template(&self, id: &str) -> ApiResponse<Value> {
        self.send(RequestDescriptor::delete(format!(
            "{API_V1}/contract-templates/{}/",
            segment(id)
        )))
        .await
    }

    /// Template text for a template type (e.g. `NDA`, `MSA`).
    pub async fn template_file(&self, template_type: &str) -> ApiResponse<TemplateFile> {
        self.send(RequestDescriptor::get(format!(
            "{API_V1}/templates/files/{}/",
            segment(template_type)
        )))
        .await
    }

    pub async fn list_template_files(&self) -> ApiResponse<ListEnvelope<FileTemplate>> {
        self.send(RequestDescriptor::get(format!("{API_V1}/templates/files/")))
            .await
    }

    /// Raw text of a library template. `{{placeholders}}` are returned
    /// untouched; see `template::fill_placeholders`.
    pub async fn template_file_content(&self, filename: &str) -> ApiResponse<FileTemplateContent> {
        self.send(RequestDescriptor::get(format!(
            "{API_V1}/templates/files/content/{}/",
            segment(filename)
        )))
        .await
    }

    /// Data-entry schema (sections of typed fields) for a library template.
    pub async fn template_file_schema(&self, filename: &str) -> ApiResponse<TemplateSchema> {
        self.send(RequestDescriptor::get(format!(
            "{API_V1}/templates/files/schema/{}/",
            segment(filename)
        )))
        .await
    }

    pub async fn create_template_file(
        &self,
        template: &NewFileTemplate,
    ) -> ApiResponse<CreatedFileTemplate> {
        self.send(RequestDescriptor::post(format!("{API_V1}/templates/files/")).json(template))
            .await
    }
}
