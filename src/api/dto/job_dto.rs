//! Job and bid request/response bodies that are not domain records.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{Bid, BidId, Category, Job};
use crate::service::AcceptOutcome;

/// Request body for `POST /jobs/{id}/completion`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRequest {
    /// Hosted proof-of-work image URL.
    pub completion_image_url: String,
}

/// Response body for `POST /jobs/{id}/bids/{bid_id}/accept`.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AcceptBidResponse {
    /// The job, now `assigned`.
    pub job: Job,
    /// The accepted bid.
    pub bid: Bid,
    /// Sibling bids rejected with the accept.
    pub rejected_bid_ids: Vec<BidId>,
}

impl From<AcceptOutcome> for AcceptBidResponse {
    fn from(outcome: AcceptOutcome) -> Self {
        Self {
            job: outcome.job,
            bid: outcome.bid,
            rejected_bid_ids: outcome.rejected,
        }
    }
}

/// Response body for `DELETE /jobs/{id}`.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeleteJobResponse {
    /// Number of bids removed with the job.
    pub removed_bids: usize,
}

/// One entry of `GET /config/categories`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CategoryInfo {
    /// Wire value.
    pub category: Category,
    /// Display label.
    pub label: &'static str,
}

impl CategoryInfo {
    /// Catalog of every category, in display order.
    #[must_use]
    pub fn catalog() -> Vec<Self> {
        Category::ALL
            .iter()
            .map(|&category| Self {
                category,
                label: match category {
                    Category::Other => "Other",
                    Category::Delivery => "Delivery",
                    Category::Cleaning => "Cleaning",
                    Category::Repairs => "Repairs",
                    Category::Tutoring => "Tutoring",
                },
            })
            .collect()
    }
}
