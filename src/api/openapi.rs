//! OpenAPI 3 document for the REST surface.
//!
//! Served as JSON at `/api-docs/openapi.json`; with the `swagger-ui` feature
//! the interactive UI is mounted at `/swagger-ui`.

use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::api::dto::{AcceptBidResponse, CategoryInfo, CompletionRequest, DeleteJobResponse};
use crate::api::handlers::{bids, feed, jobs, profiles, system};
use crate::api::identity::USER_UID_HEADER;
use crate::domain::{
    Banner, Bid, BidRange, BidStatus, Category, Coordinates, EmploymentStatus, FeedItem, HomeView,
    Job, JobLocation, JobStatus, NewBid, NewJob, Profile, ProfileUpdate,
};
use crate::error::{ErrorBody, ErrorResponse};
use crate::service::{BidWithJob, PublicProfile};

/// OpenAPI document for `/api/v1` and the system endpoints.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "geofeed-gateway",
        description = "Local jobs marketplace: post jobs, bid on them, accept one bid, complete and attest payment."
    ),
    paths(
        jobs::create_job,
        jobs::get_job,
        jobs::delete_job,
        jobs::submit_completion,
        jobs::mark_paid,
        bids::list_bids,
        bids::submit_bid,
        bids::accept_bid,
        bids::reject_bid,
        feed::feed,
        feed::home,
        feed::my_jobs,
        feed::my_bids,
        feed::work_history,
        profiles::my_profile,
        profiles::save_profile,
        profiles::public_profile,
        system::health_handler,
        system::categories_handler,
    ),
    components(
        schemas(
            Job,
            NewJob,
            JobStatus,
            JobLocation,
            BidRange,
            Category,
            Coordinates,
            Bid,
            NewBid,
            BidStatus,
            BidWithJob,
            FeedItem,
            Banner,
            HomeView,
            Profile,
            ProfileUpdate,
            EmploymentStatus,
            PublicProfile,
            CompletionRequest,
            AcceptBidResponse,
            DeleteJobResponse,
            CategoryInfo,
            system::HealthResponse,
            ErrorResponse,
            ErrorBody,
        )
    ),
    modifiers(&UserUidHeader),
    tags(
        (name = "Jobs", description = "Posting and lifecycle of jobs"),
        (name = "Bids", description = "Bidding, acceptance and rejection"),
        (name = "Discovery", description = "Location-filtered feed and home view"),
        (name = "Me", description = "Per-caller listings"),
        (name = "Profiles", description = "User profiles and public work history"),
        (name = "System", description = "Health and catalog endpoints"),
    )
)]
pub struct ApiDoc;

/// Registers the `x-user-uid` identity header as a security scheme.
#[derive(Debug)]
struct UserUidHeader;

impl Modify for UserUidHeader {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "user_uid",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(USER_UID_HEADER))),
            );
        }
    }
}
