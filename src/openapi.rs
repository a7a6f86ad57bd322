use crate::error::ApiErrorBody;
use crate::models::{Attachment, ContentKind, IncomingItem, Location, MediaRef, Post, PostStatus, User};
use crate::routes::{OutcomeBody, ReviewerActionRequest, SubmitItemRequest, SubmitterActionRequest};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::submit_item,
        crate::routes::submitter_action,
        crate::routes::reviewer_action,
        crate::routes::publish_scheduled,
        crate::routes::get_post,
    ),
    components(schemas(
        Post, PostStatus, ContentKind, Location, Attachment, MediaRef, User, IncomingItem,
        SubmitItemRequest, SubmitterActionRequest, ReviewerActionRequest,
        OutcomeBody, ApiErrorBody
    )),
    tags(
        (name = "intake", description = "Items and actions forwarded by the dispatcher"),
        (name = "posts", description = "Stored post records"),
    )
)]
pub struct ApiDoc;
