//! Data structures of the assembled application model.
//!
//! Everything here is produced once by the assembler and only read
//! afterwards. [`Application`] owns the whole graph; references between
//! entities are note ids, never pointers.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, FixedOffset};
use serde::Serialize;

use super::error::{NsfError, Result};

/// Identifier of one note inside the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NoteId(pub u32);

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NT{:08X}", self.0)
    }
}

/// Note class tag from a directory entry.
///
/// 0x0001: document, 0x0004: form, 0x0008: view, 0x0040: ACL.
/// Anything else is carried as `Other` and ignored by the assembler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoteClass {
    Document,
    Form,
    View,
    Acl,
    Other(u16),
}

impl From<u16> for NoteClass {
    fn from(value: u16) -> Self {
        match value {
            0x0001 => Self::Document,
            0x0004 => Self::Form,
            0x0008 => Self::View,
            0x0040 => Self::Acl,
            other => Self::Other(other),
        }
    }
}

impl fmt::Display for NoteClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoteClass::Document => write!(f, "document"),
            NoteClass::Form => write!(f, "form"),
            NoteClass::View => write!(f, "view"),
            NoteClass::Acl => write!(f, "acl"),
            NoteClass::Other(raw) => write!(f, "class {:#06x}", raw),
        }
    }
}

/// Declared type of a form field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Number,
    DateTime,
    Boolean,
    RichText,
    Computed,
}

impl TryFrom<u8> for FieldKind {
    type Error = NsfError;
    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Text),
            1 => Ok(Self::Number),
            2 => Ok(Self::DateTime),
            3 => Ok(Self::Boolean),
            4 => Ok(Self::RichText),
            5 => Ok(Self::Computed),
            _ => Err(NsfError::corrupt(None, format!("Unknown field kind: {}", value))),
        }
    }
}

/// One field of a form, in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDefinition {
    pub name: String,
    pub kind: FieldKind,
    /// Default-value (or computed-value) formula source, never evaluated.
    pub default_formula: Option<String>,
    /// Input validation formula source, never evaluated.
    pub validation_formula: Option<String>,
    pub required: bool,
    pub label: Option<String>,
}

/// A data-entry template.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Form {
    pub id: NoteId,
    pub name: String,
    pub aliases: Vec<String>,
    pub description: Option<String>,
    pub fields: Vec<FieldDefinition>,
    /// Parent form this one inherits from. May name a missing note; the
    /// chain never loops once assembled.
    pub parent: Option<NoteId>,
    pub created: DateTime<FixedOffset>,
    pub modified: DateTime<FixedOffset>,
}

impl Form {
    /// Look up a field declared directly on this form.
    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// True if `name` is the form name or one of its aliases.
    pub fn answers_to(&self, name: &str) -> bool {
        self.name == name || self.aliases.iter().any(|a| a == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    None,
    Ascending,
    Descending,
}

impl TryFrom<u8> for SortDirection {
    type Error = NsfError;
    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Ascending),
            2 => Ok(Self::Descending),
            _ => Err(NsfError::corrupt(None, format!("Unknown sort direction: {}", value))),
        }
    }
}

/// One column of a view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnDefinition {
    pub title: String,
    /// Source item name; `None` for purely formula-driven columns.
    pub field: Option<String>,
    pub sort: SortDirection,
    pub categorized: bool,
    pub formula: Option<String>,
    pub width: u16,
    pub hidden: bool,
}

/// A sorted/categorized summary of documents.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct View {
    pub id: NoteId,
    pub name: String,
    pub aliases: Vec<String>,
    /// Selection formula source, never evaluated.
    pub selection_formula: Option<String>,
    pub columns: Vec<ColumnDefinition>,
    pub default_view: bool,
    pub created: DateTime<FixedOffset>,
    pub modified: DateTime<FixedOffset>,
}

impl View {
    /// The value each column shows for `document`.
    ///
    /// A column whose field the document lacks (or that has no source field)
    /// yields `None` rather than an error.
    pub fn column_values<'d>(&self, document: &'d Document) -> Vec<Option<&'d FieldValue>> {
        self.columns
            .iter()
            .map(|column| column.field.as_deref().and_then(|name| document.get(name)))
            .collect()
    }

    /// Columns that take part in sorting, in column order.
    pub fn sort_columns(&self) -> impl Iterator<Item = &ColumnDefinition> {
        self.columns.iter().filter(|c| c.sort != SortDirection::None)
    }

    pub fn categorized_columns(&self) -> impl Iterator<Item = &ColumnDefinition> {
        self.columns.iter().filter(|c| c.categorized)
    }

    pub fn answers_to(&self, name: &str) -> bool {
        self.name == name || self.aliases.iter().any(|a| a == name)
    }
}

/// Weak reference from a document to the form it was created with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FormRef {
    /// By note id (`$FormRef`).
    Id(NoteId),
    /// By form name or alias (the conventional `Form` item).
    Name(String),
}

impl fmt::Display for FormRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormRef::Id(id) => write!(f, "{}", id),
            FormRef::Name(name) => write!(f, "'{}'", name),
        }
    }
}

/// A field-value record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub id: NoteId,
    /// Left as stored even when it resolves to nothing.
    pub form: Option<FormRef>,
    pub fields: BTreeMap<String, FieldValue>,
    pub readers: Vec<String>,
    pub created: DateTime<FixedOffset>,
    pub modified: DateTime<FixedOffset>,
}

impl Document {
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Text of a single-valued text item, if present.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(FieldValue::as_text)
    }
}

/// Numeric item value in its stored representation.
///
/// Floats compare by bit pattern, so a stored NaN equals itself.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Number {
    Integer(i64),
    Float(f64),
    /// `mantissa * 10^-scale`.
    Fixed { mantissa: i64, scale: u8 },
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Number::Integer(a), Number::Integer(b)) => a == b,
            (Number::Float(a), Number::Float(b)) => a.to_bits() == b.to_bits(),
            (
                Number::Fixed { mantissa: a, scale: sa },
                Number::Fixed { mantissa: b, scale: sb },
            ) => a == b && sa == sb,
            _ => false,
        }
    }
}

impl Number {
    /// Lossy conversion to `f64`.
    pub fn as_f64(&self) -> f64 {
        match *self {
            Number::Integer(v) => v as f64,
            Number::Float(v) => v,
            Number::Fixed { mantissa, scale } => mantissa as f64 / 10f64.powi(scale as i32),
        }
    }

    /// Integral value, if this number holds one exactly.
    pub fn as_integer(&self) -> Option<i64> {
        match *self {
            Number::Integer(v) => Some(v),
            Number::Fixed { mantissa, scale: 0 } => Some(mantissa),
            _ => None,
        }
    }
}

/// A rich-text item: the raw composite data plus extracted plain text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RichText {
    #[serde(skip)]
    pub raw: Vec<u8>,
    pub plain_text: String,
    /// Some records could not be represented in `plain_text`.
    pub lossy: bool,
}

/// A decoded item value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    TextList(Vec<String>),
    Number(Number),
    DateTime(DateTime<FixedOffset>),
    Boolean(bool),
    RichText(RichText),
    /// Formula source, preserved verbatim.
    Formula(String),
    /// Unrecognized or undecodable item, kept for inspection.
    Unknown { type_tag: u16, raw: Vec<u8> },
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<Number> {
        match self {
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<DateTime<FixedOffset>> {
        match self {
            FieldValue::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }

    /// Short kind name used in logs and the inspection output.
    pub fn kind_name(&self) -> &'static str {
        match self {
            FieldValue::Text(_) => "text",
            FieldValue::TextList(_) => "text-list",
            FieldValue::Number(_) => "number",
            FieldValue::DateTime(_) => "datetime",
            FieldValue::Boolean(_) => "boolean",
            FieldValue::RichText(_) => "rich-text",
            FieldValue::Formula(_) => "formula",
            FieldValue::Unknown { .. } => "unknown",
        }
    }
}

/// Access level of one ACL principal, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AclLevel {
    NoAccess,
    Depositor,
    Reader,
    Author,
    Editor,
    Designer,
    Manager,
}

impl TryFrom<u8> for AclLevel {
    type Error = NsfError;
    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::NoAccess),
            1 => Ok(Self::Depositor),
            2 => Ok(Self::Reader),
            3 => Ok(Self::Author),
            4 => Ok(Self::Editor),
            5 => Ok(Self::Designer),
            6 => Ok(Self::Manager),
            _ => Err(NsfError::corrupt(None, format!("Unknown ACL level: {}", value))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AclEntry {
    pub principal: String,
    pub level: AclLevel,
}

/// Principal name the ACL uses for everyone not listed explicitly.
pub const DEFAULT_PRINCIPAL: &str = "-Default-";

/// The assembled application: one parsed container.
///
/// Built exactly once per parse and never mutated afterwards. Collections
/// are ordered by note id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Application {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) version: u16,
    pub(crate) class: u16,
    pub(crate) replica_id: u64,
    pub(crate) created: DateTime<FixedOffset>,
    pub(crate) modified: DateTime<FixedOffset>,
    pub(crate) forms: Vec<Form>,
    pub(crate) views: Vec<View>,
    pub(crate) documents: Vec<Document>,
    pub(crate) acl: Vec<AclEntry>,
}

impl Application {
    /// Replica id rendered as 16 hex digits.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// On-disk structure version of the container.
    pub fn version(&self) -> u16 {
        self.version
    }

    pub fn class(&self) -> u16 {
        self.class
    }

    pub fn replica_id(&self) -> u64 {
        self.replica_id
    }

    pub fn created(&self) -> DateTime<FixedOffset> {
        self.created
    }

    pub fn modified(&self) -> DateTime<FixedOffset> {
        self.modified
    }

    pub fn forms(&self) -> &[Form] {
        &self.forms
    }

    pub fn views(&self) -> &[View] {
        &self.views
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn acl(&self) -> &[AclEntry] {
        &self.acl
    }

    pub fn form(&self, id: NoteId) -> Option<&Form> {
        self.forms
            .binary_search_by_key(&id, |f| f.id)
            .ok()
            .map(|idx| &self.forms[idx])
    }

    pub fn form_by_name(&self, name: &str) -> Option<&Form> {
        self.forms.iter().find(|f| f.answers_to(name))
    }

    pub fn view(&self, id: NoteId) -> Option<&View> {
        self.views
            .binary_search_by_key(&id, |v| v.id)
            .ok()
            .map(|idx| &self.views[idx])
    }

    pub fn view_by_name(&self, name: &str) -> Option<&View> {
        self.views.iter().find(|v| v.answers_to(name))
    }

    pub fn document(&self, id: NoteId) -> Option<&Document> {
        self.documents
            .binary_search_by_key(&id, |d| d.id)
            .ok()
            .map(|idx| &self.documents[idx])
    }

    /// The view flagged as default, or the first view.
    pub fn default_view(&self) -> Option<&View> {
        self.views
            .iter()
            .find(|v| v.default_view)
            .or_else(|| self.views.first())
    }

    /// Resolve a document's weak form reference.
    pub fn form_for(&self, document: &Document) -> Option<&Form> {
        match document.form.as_ref()? {
            FormRef::Id(id) => self.form(*id),
            FormRef::Name(name) => self.form_by_name(name),
        }
    }

    /// Documents whose form reference resolves to `form_id`.
    pub fn documents_by_form(&self, form_id: NoteId) -> impl Iterator<Item = &Document> {
        self.documents
            .iter()
            .filter(move |doc| self.form_for(doc).is_some_and(|f| f.id == form_id))
    }

    /// Parent chain of a form, starting with the form itself.
    ///
    /// Stops at the first parent that does not resolve.
    pub fn inheritance_chain(&self, form_id: NoteId) -> Vec<&Form> {
        let mut chain = Vec::new();
        let mut next = self.form(form_id);
        while let Some(form) = next {
            // Cycles are cut during assembly; the bound only guards misuse.
            if chain.len() > self.forms.len() {
                break;
            }
            chain.push(form);
            next = form.parent.and_then(|p| self.form(p));
        }
        chain
    }

    /// Fields of a form including inherited ones.
    ///
    /// Ancestors' fields come first; a field redeclared by a descendant
    /// replaces the inherited definition in place.
    pub fn effective_fields(&self, form_id: NoteId) -> Vec<&FieldDefinition> {
        let mut fields: Vec<&FieldDefinition> = Vec::new();
        for form in self.inheritance_chain(form_id).into_iter().rev() {
            for field in &form.fields {
                match fields.iter_mut().find(|f| f.name == field.name) {
                    Some(slot) => *slot = field,
                    None => fields.push(field),
                }
            }
        }
        fields
    }

    /// Access level of the `-Default-` ACL entry, if present.
    pub fn default_access(&self) -> Option<AclLevel> {
        self.acl
            .iter()
            .find(|e| e.principal == DEFAULT_PRINCIPAL)
            .map(|e| e.level)
    }

    pub fn access_for(&self, principal: &str) -> Option<AclLevel> {
        self.acl
            .iter()
            .find(|e| e.principal == principal)
            .map(|e| e.level)
            .or_else(|| self.default_access())
    }
}
