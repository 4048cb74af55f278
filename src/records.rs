//! The dateframeable records Popolo attaches to people, organizations and the
//! other entities, plus the links and sources that annotate them.
//!
//! Each record names its logical-equality key: two records with equal keys
//! describe the same fact and are reconciled against each other, whatever
//! their notes or sources say.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::construct::{Dateframeable, HasValidityInterval, RecordId};
use crate::datatype::Percentage;
use crate::error::{PopoloError, Result};
use crate::interval::PartialDateInterval;

fn required(kind: &'static str, field: &'static str, value: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(PopoloError::InvalidRecord { kind, field });
    }
    Ok(value.to_string())
}

macro_rules! has_validity {
    ($($record:ty),+) => {
        $(
            impl HasValidityInterval for $record {
                fn validity(&self) -> &PartialDateInterval {
                    &self.validity
                }
                fn set_validity(&mut self, validity: PartialDateInterval) {
                    self.validity = validity;
                }
            }
        )+
    };
}

has_validity!(Identifier, OtherName, ContactDetail, Membership, Ownership, Classification);

// ------------- Identifier -------------
/// An issued identifier, e.g. a tax code or a DUNS number.
#[derive(PartialEq, Eq, Debug, Clone, Serialize, Deserialize)]
pub struct Identifier {
    #[serde(default)]
    pub scheme: String,
    #[serde(default)]
    pub identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(flatten)]
    pub validity: PartialDateInterval,
}
impl Identifier {
    pub fn new(scheme: &str, identifier: &str, validity: PartialDateInterval) -> Self {
        Self {
            scheme: scheme.to_string(),
            identifier: identifier.to_string(),
            source: None,
            validity,
        }
    }
    pub fn with_source(mut self, source: &str) -> Self {
        self.source = Some(source.to_string());
        self
    }
}
impl Dateframeable for Identifier {
    const KIND: &'static str = "identifier";
    type Key = (String, String);
    fn logical_key(&self) -> Result<Self::Key> {
        Ok((
            required(Self::KIND, "scheme", &self.scheme)?,
            required(Self::KIND, "identifier", &self.identifier)?,
        ))
    }
}
impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.scheme, self.identifier)
    }
}

// ------------- OtherName -------------
#[derive(PartialEq, Eq, Hash, Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub enum OtherNameType {
    #[serde(rename = "FOR")]
    Former,
    #[default]
    #[serde(rename = "ALT")]
    Alternate,
    #[serde(rename = "AKA")]
    AlsoKnownAs,
    #[serde(rename = "NIC")]
    Nickname,
    #[serde(rename = "ACR")]
    Acronym,
}

/// An alternate or former name.
#[derive(PartialEq, Eq, Debug, Clone, Serialize, Deserialize)]
pub struct OtherName {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub othername_type: OtherNameType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(flatten)]
    pub validity: PartialDateInterval,
}
impl OtherName {
    pub fn new(name: &str, othername_type: OtherNameType, validity: PartialDateInterval) -> Self {
        Self {
            name: name.to_string(),
            othername_type,
            note: None,
            source: None,
            validity,
        }
    }
    pub fn with_note(mut self, note: &str) -> Self {
        self.note = Some(note.to_string());
        self
    }
}
impl Dateframeable for OtherName {
    const KIND: &'static str = "other_name";
    type Key = (OtherNameType, String);
    fn logical_key(&self) -> Result<Self::Key> {
        Ok((self.othername_type, required(Self::KIND, "name", &self.name)?))
    }
}

// ------------- ContactDetail -------------
#[derive(PartialEq, Eq, Hash, Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ContactType {
    Address,
    Email,
    Url,
    Mail,
    Twitter,
    Facebook,
    Phone,
    Mobile,
    Text,
    Voice,
    Fax,
    Cell,
    Video,
    Instagram,
    Youtube,
    Pager,
    Textphone,
}

/// A means of contacting an entity.
#[derive(PartialEq, Eq, Debug, Clone, Serialize, Deserialize)]
pub struct ContactDetail {
    pub contact_type: ContactType,
    #[serde(default)]
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(flatten)]
    pub validity: PartialDateInterval,
}
impl ContactDetail {
    pub fn new(contact_type: ContactType, value: &str, validity: PartialDateInterval) -> Self {
        Self {
            contact_type,
            value: value.to_string(),
            label: None,
            note: None,
            validity,
        }
    }
    pub fn with_label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }
}
impl Dateframeable for ContactDetail {
    const KIND: &'static str = "contact_detail";
    type Key = (ContactType, String);
    fn logical_key(&self) -> Result<Self::Key> {
        Ok((self.contact_type, required(Self::KIND, "value", &self.value)?))
    }
}

// ------------- Membership -------------
/// Membership of the owner in an organization, optionally through a post.
#[derive(PartialEq, Eq, Debug, Clone, Serialize, Deserialize)]
pub struct Membership {
    #[serde(default)]
    pub organization: Option<RecordId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post: Option<RecordId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(flatten)]
    pub validity: PartialDateInterval,
}
impl Membership {
    pub fn new(organization: RecordId, validity: PartialDateInterval) -> Self {
        Self {
            organization: Some(organization),
            post: None,
            label: None,
            role: None,
            validity,
        }
    }
    pub fn through_post(mut self, post: RecordId, role: &str) -> Self {
        self.post = Some(post);
        self.role = Some(role.to_string());
        self
    }
}
impl Dateframeable for Membership {
    const KIND: &'static str = "membership";
    type Key = (RecordId, Option<RecordId>);
    fn logical_key(&self) -> Result<Self::Key> {
        let organization = self
            .organization
            .ok_or(PopoloError::InvalidRecord { kind: Self::KIND, field: "organization" })?;
        Ok((organization, self.post))
    }
}

// ------------- Ownership -------------
/// Share of an organization held by the owner.
#[derive(PartialEq, Eq, Debug, Clone, Serialize, Deserialize)]
pub struct Ownership {
    #[serde(default)]
    pub owned_organization: Option<RecordId>,
    #[serde(default)]
    pub percentage: Percentage,
    #[serde(flatten)]
    pub validity: PartialDateInterval,
}
impl Ownership {
    pub fn new(owned_organization: RecordId, percentage: Percentage, validity: PartialDateInterval) -> Self {
        Self {
            owned_organization: Some(owned_organization),
            percentage,
            validity,
        }
    }
}
// Stakes in one organization are a single fact whatever the share, so a
// merged ownership takes the candidate's percentage.
impl Dateframeable for Ownership {
    const KIND: &'static str = "ownership";
    type Key = RecordId;
    fn logical_key(&self) -> Result<Self::Key> {
        self.owned_organization
            .ok_or(PopoloError::InvalidRecord { kind: Self::KIND, field: "owned_organization" })
    }
}

// ------------- Classification -------------
/// A classification tag, e.g. a legal form or an economic activity code,
/// valid for a period of time.
#[derive(PartialEq, Eq, Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    #[serde(default)]
    pub scheme: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descr: Option<String>,
    #[serde(flatten)]
    pub validity: PartialDateInterval,
}
impl Classification {
    pub fn new(scheme: &str, code: Option<&str>, descr: Option<&str>, validity: PartialDateInterval) -> Self {
        Self {
            scheme: scheme.to_string(),
            code: code.map(str::to_string),
            descr: descr.map(str::to_string),
            validity,
        }
    }
}
impl Dateframeable for Classification {
    const KIND: &'static str = "classification";
    type Key = (String, Option<String>, Option<String>);
    fn logical_key(&self) -> Result<Self::Key> {
        let scheme = required(Self::KIND, "scheme", &self.scheme)?;
        let code = self.code.as_deref().map(str::trim).filter(|c| !c.is_empty());
        let descr = self.descr.as_deref().map(str::trim).filter(|d| !d.is_empty());
        if code.is_none() && descr.is_none() {
            return Err(PopoloError::InvalidRecord { kind: Self::KIND, field: "code or descr" });
        }
        Ok((scheme, code.map(str::to_string), descr.map(str::to_string)))
    }
}

// ------------- Links and sources -------------
#[derive(PartialEq, Eq, Hash, Debug, Clone, Copy)]
pub enum ReferenceKind {
    Link,
    Source,
}
impl ReferenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceKind::Link => "link",
            ReferenceKind::Source => "source",
        }
    }
}

/// A URL with a note, shared among all the owners referring to it.
#[derive(PartialEq, Eq, Hash, Debug, Clone, Serialize, Deserialize)]
pub struct Reference {
    pub url: String,
    #[serde(default)]
    pub note: String,
}
impl Reference {
    pub fn new(url: &str, note: &str) -> Result<Self> {
        let reference = Self { url: url.trim().to_string(), note: note.to_string() };
        reference.validate()?;
        Ok(reference)
    }
    pub fn validate(&self) -> Result<()> {
        required("reference", "url", &self.url).map(|_| ())
    }
}
