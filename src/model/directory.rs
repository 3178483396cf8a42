//! The remote listing of a package (`<directory>`), as returned by the source
//! routes and cached in `.osc/_files`.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Snapshot of a package at one revision
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename = "directory")]
pub struct Directory {
    #[serde(rename = "@name", default)]
    pub name: String,

    #[serde(rename = "@rev", default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,

    #[serde(rename = "@vrev", default, skip_serializing_if = "Option::is_none")]
    pub vrev: Option<String>,

    /// Hash over the whole file list at this revision
    #[serde(rename = "@srcmd5", default, skip_serializing_if = "Option::is_none")]
    pub srcmd5: Option<String>,

    #[serde(rename = "linkinfo", default, skip_serializing_if = "Option::is_none")]
    pub link_info: Option<LinkInfo>,

    #[serde(rename = "serviceinfo", default, skip_serializing_if = "Option::is_none")]
    pub service_info: Option<ServiceInfo>,

    #[serde(rename = "entry", default)]
    pub entries: Vec<DirectoryEntry>,
}

/// One file of a [`Directory`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    #[serde(rename = "@name")]
    pub name: String,

    #[serde(rename = "@md5", default, skip_serializing_if = "Option::is_none")]
    pub md5: Option<String>,

    #[serde(rename = "@size", default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,

    /// Unix timestamp in seconds
    #[serde(rename = "@mtime", default, skip_serializing_if = "Option::is_none")]
    pub mtime: Option<i64>,
}

/// Present when the package is a link onto another package's sources
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LinkInfo {
    #[serde(rename = "@project")]
    pub project: String,

    #[serde(rename = "@package")]
    pub package: String,

    #[serde(rename = "@srcmd5", default)]
    pub srcmd5: String,

    #[serde(rename = "@baserev", default, skip_serializing_if = "Option::is_none")]
    pub baserev: Option<String>,

    /// Hash of the expanded (link applied) sources
    #[serde(rename = "@xsrcmd5", default, skip_serializing_if = "Option::is_none")]
    pub xsrcmd5: Option<String>,

    /// Hash of the unexpanded link sources
    #[serde(rename = "@lsrcmd5", default, skip_serializing_if = "Option::is_none")]
    pub lsrcmd5: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServiceInfo {
    #[serde(rename = "@code", default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    #[serde(rename = "@error", default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(rename = "@xsrcmd5", default, skip_serializing_if = "Option::is_none")]
    pub xsrcmd5: Option<String>,

    #[serde(rename = "@lsrcmd5", default, skip_serializing_if = "Option::is_none")]
    pub lsrcmd5: Option<String>,
}

impl Directory {
    pub fn from_xml(xml: &str) -> Result<Self> {
        Ok(quick_xml::de::from_str(xml)?)
    }

    pub fn to_xml(&self) -> Result<String> {
        Ok(quick_xml::se::to_string(self)?)
    }

    /// The hash identifying this revision's contents.
    ///
    /// For links the expanded hash wins, since that is what was checked out.
    pub fn content_hash(&self) -> Option<&str> {
        self.link_info
            .as_ref()
            .and_then(|link| link.xsrcmd5.as_deref())
            .or(self.srcmd5.as_deref())
    }

    /// Copy of this directory's header with a different entry list
    pub fn with_entries(&self, entries: Vec<DirectoryEntry>) -> Self {
        Directory {
            entries,
            ..self.clone()
        }
    }
}

/// Payload of a `commitfilelist` request
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename = "directory")]
pub struct CommitFileList {
    #[serde(rename = "entry", default)]
    pub entries: Vec<CommitEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitEntry {
    #[serde(rename = "@name")]
    pub name: String,

    #[serde(rename = "@md5")]
    pub md5: String,

    /// `sha256:<hex>` digest, checked by the server independently of `md5`
    #[serde(rename = "@hash")]
    pub hash: String,
}

impl CommitFileList {
    pub fn from_xml(xml: &str) -> Result<Self> {
        Ok(quick_xml::de::from_str(xml)?)
    }

    pub fn to_xml(&self) -> Result<String> {
        Ok(quick_xml::se::to_string(self)?)
    }
}
