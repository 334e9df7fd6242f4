//! Workflows and approval requests

use serde::Serialize;
use serde_json::Value;

use crate::client::{ApiClient, ListParams, RequestDescriptor, segment};
use crate::contracts::API_V1;
use crate::envelope::{ApiResponse, ListEnvelope};
use crate::models::{ApprovalInput, ApprovalRequest, ApprovalStatus, Workflow, WorkflowInput};

#[derive(Serialize)]
struct Decision<'a> {
    status: ApprovalStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    comment: Option<&'a str>,
}

impl ApiClient {
    pub async fn create_workflow(&self, input: &WorkflowInput) -> ApiResponse<Workflow> {
        self.send(RequestDescriptor::post(format!("{API_V1}/workflows/")).json(input))
            .await
    }

    pub async fn list_workflows(&self) -> ApiResponse<ListEnvelope<Workflow>> {
        self.send(RequestDescriptor::get(format!("{API_V1}/workflows/")))
            .await
    }

    pub async fn get_workflow(&self, id: &str) -> ApiResponse<Workflow> {
        self.send(RequestDescriptor::get(format!("{API_V1}/workflows/{}/", segment(id))))
            .await
    }

    pub async fn update_workflow(&self, id: &str, input: &WorkflowInput) -> ApiResponse<Workflow> {
        self.send(
            RequestDescriptor::put(format!("{API_V1}/workflows/{}/", segment(id))).json(input),
        )
        .await
    }

    pub async fn delete_workflow(&self, id: &str) -> ApiResponse<Value> {
        self.send(RequestDescriptor::delete(format!("{API_V1}/workflows/{}/", segment(id))))
            .await
    }

    pub async fn workflow_instances(&self, workflow_id: &str) -> ApiResponse<ListEnvelope<Value>> {
        self.send(RequestDescriptor::get(format!(
            "{API_V1}/workflows/{}/instances/",
            segment(workflow_id)
        )))
        .await
    }

    pub async fn create_approval(&self, input: &ApprovalInput) -> ApiResponse<ApprovalRequest> {
        self.send(RequestDescriptor::post(format!("{API_V1}/approvals/")).json(input))
            .await
    }

    pub async fn list_approvals(
        &self,
        params: &ListParams,
    ) -> ApiResponse<ListEnvelope<ApprovalRequest>> {
        self.send(RequestDescriptor::get(format!("{API_V1}/approvals/")).params(params))
            .await
    }

    pub async fn get_approval(&self, id: &str) -> ApiResponse<ApprovalRequest> {
        self.send(RequestDescriptor::get(format!("{API_V1}/approvals/{}/", segment(id))))
            .await
    }

    pub async fn update_approval(
        &self,
        id: &str,
        input: &ApprovalInput,
    ) -> ApiResponse<ApprovalRequest> {
        self.send(
            RequestDescriptor::put(format!("{API_V1}/approvals/{}/", segment(id))).json(input),
        )
        .await
    }

    pub async fn approve(&self, id: &str, comment: Option<&str>) -> ApiResponse<ApprovalRequest> {
        self.decide(id, ApprovalStatus::Approved, comment).await
    }

    /// Reject a request; `reason` is sent as the approval comment.
    pub async fn reject(&self, id: &str, reason: Option<&str>) -> ApiResponse<ApprovalRequest> {
        self.decide(id, ApprovalStatus::Rejected, reason).await
    }

    async fn decide(
        &self,
        id: &str,
        status: ApprovalStatus,
        comment: Option<&str>,
    ) -> ApiResponse<ApprovalRequest> {
        let body = Decision { status, comment };
        self.send(RequestDescriptor::put(format!("{API_V1}/approvals/{}/", segment(id))).json(&body))
            .await
    }
}
