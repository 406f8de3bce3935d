// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Uploaded SQL file metadata. The bytes themselves live behind
//! `infrastructure::file_store::SqlFileStore`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::domain::connection::FactoryId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(pub Uuid);

impl FileId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for FileId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlFileType {
    Sql,
    Bak,
}

impl SqlFileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SqlFileType::Sql => "sql",
            SqlFileType::Bak => "bak",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sql" => Some(SqlFileType::Sql),
            "bak" => Some(SqlFileType::Bak),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Uploaded,
    Processing,
    Processed,
    Failed,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Uploaded => "uploaded",
            FileStatus::Processing => "processing",
            FileStatus::Processed => "processed",
            FileStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "uploaded" => Some(FileStatus::Uploaded),
            "processing" => Some(FileStatus::Processing),
            "processed" => Some(FileStatus::Processed),
            "failed" => Some(FileStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub id: FileId,
    pub factory_id: FactoryId,
    pub file_name: String,
    pub file_type: SqlFileType,
    /// Location understood by the file store, relative to its root.
    pub file_path: String,
    pub file_size: i64,
    pub status: FileStatus,
    pub metadata: Option<serde_json::Value>,
    pub uploaded_at: DateTime<Utc>,
}

impl UploadedFile {
    pub fn new(
        factory_id: FactoryId,
        file_name: impl Into<String>,
        file_type: SqlFileType,
        file_path: impl Into<String>,
        file_size: i64,
    ) -> Self {
        Self {
            id: FileId::new(),
            factory_id,
            file_name: file_name.into(),
            file_type,
            file_path: file_path.into(),
            file_size,
            status: FileStatus::Uploaded,
            metadata: None,
            uploaded_at: Utc::now(),
        }
    }
}
