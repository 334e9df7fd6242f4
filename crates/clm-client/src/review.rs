//! Uploaded-contract review and analysis reports

use bytes::Bytes;
use reqwest::header::{ACCEPT, HeaderValue};

use crate::client::{ApiClient, ListParams, RequestDescriptor, segment};
use crate::contracts::API_V1;
use crate::envelope::{ApiResponse, ListEnvelope};
use crate::models::{ReportFormat, ReviewContract, SignedUrl};

impl ApiClient {
    pub async fn list_review_contracts(
        &self,
        params: &ListParams,
    ) -> ApiResponse<ListEnvelope<ReviewContract>> {
        self.send(RequestDescriptor::get(format!("{API_V1}/review-contracts/")).params(params))
            .await
    }

    pub async fn get_review_contract(&self, id: &str) -> ApiResponse<ReviewContract> {
        self.send(RequestDescriptor::get(format!(
            "{API_V1}/review-contracts/{}/",
            segment(id)
        )))
        .await
    }

    /// Short-lived URL of the uploaded original.
    pub async fn review_contract_url(&self, id: &str) -> ApiResponse<SignedUrl> {
        self.send(RequestDescriptor::get(format!(
            "{API_V1}/review-contracts/{}/url/",
            segment(id)
        )))
        .await
    }

    /// Run (or re-run) analysis; returns the updated record.
    pub async fn analyze_review_contract(&self, id: &str) -> ApiResponse<ReviewContract> {
        self.send(
            RequestDescriptor::post(format!("{API_V1}/review-contracts/{}/analyze/", segment(id)))
                .json(&serde_json::json!({})),
        )
        .await
    }

    pub async fn download_review_report(&self, id: &str, format: ReportFormat) -> ApiResponse<Bytes> {
        let accept = match format {
            ReportFormat::Txt => "text/plain",
            ReportFormat::Pdf => "application/pdf",
        };
        self.send_bytes(
            RequestDescriptor::get(format!("{API_V1}/review-contracts/{}/report/", segment(id)))
                .query("format", format.extension())
                .header(ACCEPT, HeaderValue::from_static(accept)),
        )
        .await
    }
}
