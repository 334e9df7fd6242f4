//! Contracts and clauses

use serde::Serialize;
use serde_json::Value;

use crate::client::{ApiClient, ListParams, RequestDescriptor, segment};
use crate::envelope::{ApiResponse, ListEnvelope};
use crate::models::{
    Clause, Contract, ContractFromContent, ContractFromFileResponse, ContractGenerateResponse,
    ContractInput, ContractPreview, ContractStatistics, GenerationInputs,
};

pub(crate) const API_V1: &str = "/api/v1";

const DEFAULT_RECENT_LIMIT: u32 = 5;

#[derive(Serialize)]
struct GenerateBody<'a> {
    template_id: &'a str,
    #[serde(flatten)]
    inputs: &'a GenerationInputs,
}

#[derive(Serialize)]
struct FromFileBody<'a> {
    filename: &'a str,
    #[serde(flatten)]
    inputs: &'a GenerationInputs,
}

#[derive(Serialize)]
struct VersionBody<'a> {
    change_summary: &'a str,
    selected_clauses: &'a [String],
}

impl ApiClient {
    pub async fn create_contract(&self, input: &ContractInput) -> ApiResponse<Contract> {
        self.send(RequestDescriptor::post(format!("{API_V1}/contracts/")).json(input))
            .await
    }

    /// Save already rendered text (e.g. AI editor output) as a draft.
    pub async fn create_contract_from_content(
        &self,
        draft: &ContractFromContent,
    ) -> ApiResponse<Contract> {
        self.send(RequestDescriptor::post(format!("{API_V1}/contracts/from-content/")).json(draft))
            .await
    }

    /// Generate a contract from a database template.
    pub async fn generate_contract(
        &self,
        template_id: &str,
        inputs: &GenerationInputs,
    ) -> ApiResponse<ContractGenerateResponse> {
        let body = GenerateBody {
            template_id,
            inputs,
        };
        self.send(RequestDescriptor::post(format!("{API_V1}/contracts/generate/")).json(&body))
            .await
    }

    /// Generate a contract from a file-backed template.
    pub async fn generate_contract_from_file(
        &self,
        filename: &str,
        inputs: &GenerationInputs,
    ) -> ApiResponse<ContractFromFileResponse> {
        let body = FromFileBody { filename, inputs };
        self.send(
            RequestDescriptor::post(format!("{API_V1}/contracts/generate-from-file/")).json(&body),
        )
        .await
    }

    /// Render a file-backed template without saving anything.
    pub async fn preview_contract_from_file(
        &self,
        filename: &str,
        inputs: &GenerationInputs,
    ) -> ApiResponse<ContractPreview> {
        let body = FromFileBody { filename, inputs };
        self.send(
            RequestDescriptor::post(format!("{API_V1}/contracts/preview-from-file/")).json(&body),
        )
        .await
    }

    pub async fn list_contracts(&self, params: &ListParams) -> ApiResponse<ListEnvelope<Contract>> {
        self.send(RequestDescriptor::get(format!("{API_V1}/contracts/")).params(params))
            .await
    }

    pub async fn get_contract(&self, id: &str) -> ApiResponse<Contract> {
        self.send(RequestDescriptor::get(format!("{API_V1}/contracts/{}/", segment(id))))
            .await
    }

    pub async fn update_contract(&self, id: &str, input: &ContractInput) -> ApiResponse<Contract> {
        self.send(
            RequestDescriptor::put(format!("{API_V1}/contracts/{}/", segment(id))).json(input),
        )
        .await
    }

    pub async fn delete_contract(&self, id: &str) -> ApiResponse<Value> {
        self.send(RequestDescriptor::delete(format!("{API_V1}/contracts/{}/", segment(id))))
            .await
    }

    pub async fn clone_contract(&self, id: &str, new_title: &str) -> ApiResponse<Contract> {
        self.send(
            RequestDescriptor::post(format!("{API_V1}/contracts/{}/clone/", segment(id)))
                .json(&serde_json::json!({ "title": new_title })),
        )
        .await
    }

    pub async fn contract_versions(&self, id: &str) -> ApiResponse<ListEnvelope<Value>> {
        self.send(RequestDescriptor::get(format!(
            "{API_V1}/contracts/{}/versions/",
            segment(id)
        )))
        .await
    }

    pub async fn create_contract_version(
        &self,
        id: &str,
        change_summary: &str,
        selected_clauses: &[String],
    ) -> ApiResponse<Value> {
        let body = VersionBody {
            change_summary,
            selected_clauses,
        };
        self.send(
            RequestDescriptor::post(format!("{API_V1}/contracts/{}/versions/", segment(id)))
                .json(&body),
        )
        .await
    }

    pub async fn contract_statistics(&self) -> ApiResponse<ContractStatistics> {
        self.send(RequestDescriptor::get(format!("{API_V1}/contracts/statistics/")))
            .await
    }

    /// Most recently touched contracts; `None` asks for the default five.
    pub async fn recent_contracts(&self, limit: Option<u32>) -> ApiResponse<ListEnvelope<Contract>> {
        self.send(
            RequestDescriptor::get(format!("{API_V1}/contracts/recent/"))
                .query("limit", limit.unwrap_or(DEFAULT_RECENT_LIMIT)),
        )
        .await
    }

    pub async fn validate_clauses(&self, clauses: &[Value]) -> ApiResponse<Value> {
        self.send(
            RequestDescriptor::post(format!("{API_V1}/contracts/validate-clauses/"))
                .json(&serde_json::json!({ "clauses": clauses })),
        )
        .await
    }

    /// Clause library, filtered by `contract_type`, `status`, `search`, ...
    pub async fn list_clauses(&self, params: &ListParams) -> ApiResponse<ListEnvelope<Clause>> {
        self.send(RequestDescriptor::get(format!("{API_V1}/clauses/")).params(params))
            .await
    }
}
