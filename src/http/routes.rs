// SPDX-License-Identifier: MPL-2.0

use super::error::AppError;
use crate::ledger::{EngagementState, ToggleRequest};
use crate::model::{Comment, EngagementKind, EntityRef, Post, Profile, Reply, TargetType};
use crate::projector::CounterAudit;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

type Shared = State<Arc<AppState>>;
type Body<T> = Result<Json<T>, JsonRejection>;

/// Pull a required string field out of a request body
fn field(name: &str, value: Option<String>) -> Result<String, AppError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| AppError::Validation(format!("missing required field: {name}")))
}

fn parse<T: FromStr<Err = String>>(name: &str, value: Option<String>) -> Result<T, AppError> {
    field(name, value)?
        .parse()
        .map_err(|e| AppError::Validation(format!("invalid {name}: {e}")))
}

#[derive(Serialize)]
pub struct Message {
    pub message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngageBody {
    actor: Option<String>,
    target: Option<String>,
    recipient: Option<String>,
    target_type: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

#[derive(Serialize)]
pub struct EngageResponse {
    success: bool,
    #[serde(rename = "type")]
    kind: EngagementKind,
    active: bool,
}

pub async fn engage(
    State(state): Shared,
    body: Body<EngageBody>,
) -> Result<Json<EngageResponse>, AppError> {
    let Json(body) = body?;
    let request = ToggleRequest {
        actor: field("actor", body.actor)?,
        target: field("target", body.target)?,
        recipient: field("recipient", body.recipient)?,
        target_type: parse::<TargetType>("targetType", body.target_type)?,
        kind: parse::<EngagementKind>("type", body.kind)?,
    };

    let outcome = state.ledger.toggle(&request).await?;
    Ok(Json(EngageResponse {
        success: true,
        kind: outcome.kind,
        active: outcome.active,
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateBody {
    actor: Option<String>,
    post_id: Option<String>,
    #[serde(default)]
    comment_ids: Vec<String>,
    #[serde(default)]
    reply_ids: Vec<String>,
}

pub async fn engagement_state(
    State(state): Shared,
    body: Body<StateBody>,
) -> Result<Json<EngagementState>, AppError> {
    let Json(body) = body?;
    let actor = field("actor", body.actor)?;
    let post_id = field("postId", body.post_id)?;

    let result = state
        .ledger
        .engagement_state(&actor, &post_id, &body.comment_ids, &body.reply_ids)
        .await?;
    Ok(Json(result))
}

#[derive(Deserialize)]
pub struct ProfileBody {
    id: Option<String>,
    name: Option<String>,
}

pub async fn create_profile(
    State(state): Shared,
    body: Body<ProfileBody>,
) -> Result<(StatusCode, Json<Profile>), AppError> {
    let Json(body) = body?;
    let profile = state
        .content
        .register_profile(&field("id", body.id)?, &field("name", body.name)?)
        .await?;
    Ok((StatusCode::CREATED, Json(profile)))
}

pub async fn get_profile(
    State(state): Shared,
    Path(id): Path<String>,
) -> Result<Json<Profile>, AppError> {
    Ok(Json(state.content.profile(&id).await?))
}

#[derive(Deserialize)]
pub struct PostBody {
    author: Option<String>,
    title: Option<String>,
    #[serde(default)]
    body: String,
}

pub async fn create_post(
    State(state): Shared,
    body: Body<PostBody>,
) -> Result<(StatusCode, Json<Post>), AppError> {
    let Json(body) = body?;
    let post = state
        .content
        .create_post(
            &field("author", body.author)?,
            &field("title", body.title)?,
            &body.body,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(post)))
}

pub async fn get_post(
    State(state): Shared,
    Path(id): Path<String>,
) -> Result<Json<Post>, AppError> {
    Ok(Json(state.content.post(&id).await?))
}

pub async fn delete_post(
    State(state): Shared,
    Path(id): Path<String>,
) -> Result<Json<Message>, AppError> {
    let report = state.cascade.delete_post(&id).await?;
    Ok(Json(Message {
        message: report.message(),
    }))
}

pub async fn put_widget(
    State(state): Shared,
    Path(id): Path<String>,
    body: Body<serde_json::Value>,
) -> Result<Json<Message>, AppError> {
    let Json(config) = body?;
    state.content.set_widget(&id, config).await?;
    Ok(Json(Message {
        message: "Widget saved".to_string(),
    }))
}

pub async fn audit_post(
    State(state): Shared,
    Path(id): Path<String>,
) -> Result<Json<CounterAudit>, AppError> {
    Ok(Json(state.projector.audit(&EntityRef::post(id)).await?))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentBody {
    author: Option<String>,
    post_id: Option<String>,
    body: Option<String>,
}

pub async fn create_comment(
    State(state): Shared,
    body: Body<CommentBody>,
) -> Result<(StatusCode, Json<Comment>), AppError> {
    let Json(body) = body?;
    let comment = state
        .content
        .create_comment(
            &field("author", body.author)?,
            &field("postId", body.post_id)?,
            &field("body", body.body)?,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

pub async fn get_comment(
    State(state): Shared,
    Path(id): Path<String>,
) -> Result<Json<Comment>, AppError> {
    Ok(Json(state.content.comment(&id).await?))
}

pub async fn delete_comment(
    State(state): Shared,
    Path(id): Path<String>,
) -> Result<Json<Message>, AppError> {
    let report = state.cascade.delete_comment(&id).await?;
    Ok(Json(Message {
        message: report.message(),
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyBody {
    author: Option<String>,
    comment_id: Option<String>,
    body: Option<String>,
}

pub async fn create_reply(
    State(state): Shared,
    body: Body<ReplyBody>,
) -> Result<(StatusCode, Json<Reply>), AppError> {
    let Json(body) = body?;
    let reply = state
        .content
        .create_reply(
            &field("author", body.author)?,
            &field("commentId", body.comment_id)?,
            &field("body", body.body)?,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(reply)))
}

pub async fn delete_reply(
    State(state): Shared,
    Path(id): Path<String>,
) -> Result<Json<Message>, AppError> {
    let report = state.cascade.delete_reply(&id).await?;
    Ok(Json(Message {
        message: report.message(),
    }))
}
