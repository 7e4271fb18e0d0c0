//! REST API Data Transfer Objects
//!
//! Defines request/response types for the REST API endpoints.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::base_data::BaseDataEntry;
use crate::chapters::Chapter;
use crate::config::Layout;
use crate::resolver::ResolverState;
use crate::session_info::{DbClass, SessionInfo};

/// JSON response: { success, data?, error? }
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiErrorDto>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

impl ApiResponse<()> {
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiErrorDto {
                code: code.into(),
                message: message.into(),
            }),
        }
    }
}

/// Error details in API response
#[derive(Debug, Serialize)]
pub struct ApiErrorDto {
    pub code: String,
    pub message: String,
}

// Admin DTOs
/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthDto {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    /// Whether this process already launched its retention sweep
    pub sweep_started: bool,
}

// Session DTOs
/// Resolver outcome for the requesting browser
#[derive(Debug, Serialize)]
pub struct SessionDto {
    pub state: ResolverState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_class: Option<DbClass>,
    /// Expiry of a token issued by this request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Contents of the consent dialog
#[derive(Debug, Serialize)]
pub struct ConsentPromptDto {
    pub user_id: String,
    pub text: String,
    /// Preselected base dataset
    pub default_base_data: Option<String>,
    pub options: Vec<BaseDataEntry>,
}

/// Result of deleting the private store
#[derive(Debug, Serialize)]
pub struct DeletionDto {
    pub db_name: String,
    /// False when there was nothing left to delete
    pub existed: bool,
}

// Navigation DTOs
/// One selectable chapter
#[derive(Debug, Serialize)]
pub struct ChapterDto {
    pub key: &'static str,
    pub label: &'static str,
}

impl From<Chapter> for ChapterDto {
    fn from(chapter: Chapter) -> Self {
        Self {
            key: chapter.key(),
            label: chapter.label(),
        }
    }
}

/// Page settings and the chapters offered to the session
#[derive(Debug, Serialize)]
pub struct NavigationDto {
    pub page_title: String,
    pub layout: Layout,
    pub chapters: Vec<ChapterDto>,
}
