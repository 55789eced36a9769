//! Structural assembler: turns the located notes into one [`Application`].
//!
//! Notes are collected first and processed in ascending id order, so the
//! model never depends on directory layout. Cross-note checks (inheritance,
//! form references, unique field names) run once every note is in.

use std::collections::{BTreeMap, HashSet};

use log::{debug, info, trace};

use crate::nsf::format::design;
use crate::nsf::format::directory::{NoteLocation, NoteWalker};
use crate::nsf::format::header::{DatabaseInfo, FileHeader};
use crate::nsf::format::items::{self, ItemType, NoteBody, RawItem};
use crate::nsf::types::diagnostics::{DiagnosticKind, Diagnostics};
use crate::nsf::types::error::{NsfError, Result};
use crate::nsf::types::models::*;
use crate::nsf::types::options::ParseOptions;

const UNTITLED: &str = "Untitled";
/// Item naming the document's form by name, when no `$FormRef` is stored.
const FORM_NAME_ITEM: &str = "Form";

/// Items with a fixed meaning. Matched ignoring ASCII case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reserved {
    Title,
    Comment,
    ParentForm,
    Formula,
    DefaultView,
    FormRef,
    Readers,
}

impl Reserved {
    const NAMES: [(&'static str, Reserved); 7] = [
        ("$TITLE", Reserved::Title),
        ("$Comment", Reserved::Comment),
        ("$ParentForm", Reserved::ParentForm),
        ("$FORMULA", Reserved::Formula),
        ("$DefaultView", Reserved::DefaultView),
        ("$FormRef", Reserved::FormRef),
        ("$Readers", Reserved::Readers),
    ];

    fn from_name(name: &str) -> Option<Self> {
        Self::NAMES
            .iter()
            .find(|(reserved, _)| reserved.eq_ignore_ascii_case(name))
            .map(|(_, kind)| *kind)
    }
}

/// Build the application model from a validated container.
pub fn assemble(
    file: &[u8],
    header: &FileHeader,
    info: DatabaseInfo,
    options: &ParseOptions,
) -> Result<(Application, Diagnostics)> {
    let mut assembler = Assembler::new(file, options);

    let notes = assembler.collect_notes(header)?;
    info!("Located {} notes", notes.len());
    for location in notes.into_values() {
        assembler.process(&location)?;
    }

    assembler.check_inheritance();
    assembler.resolve_form_refs();
    assembler.validate()?;

    Ok(assembler.finish(header, info))
}

struct Assembler<'a> {
    file: &'a [u8],
    options: &'a ParseOptions,
    diagnostics: Diagnostics,
    forms: Vec<Form>,
    views: Vec<View>,
    documents: Vec<Document>,
    acl: Vec<AclEntry>,
}

impl<'a> Assembler<'a> {
    fn new(file: &'a [u8], options: &'a ParseOptions) -> Self {
        Self {
            file,
            options,
            diagnostics: Diagnostics::new(),
            forms: Vec::new(),
            views: Vec::new(),
            documents: Vec::new(),
            acl: Vec::new(),
        }
    }

    /// Walk every directory, keyed by note id. Skipped entries become
    /// diagnostics; only a broken root directory fails.
    fn collect_notes(&mut self, header: &FileHeader) -> Result<BTreeMap<NoteId, NoteLocation>> {
        let walker = NoteWalker::new(self.file, header.root_offset, header.root_len, self.options)?;
        let mut notes = BTreeMap::new();
        for result in walker {
            match result {
                Ok(location) => {
                    notes.insert(location.id, location);
                }
                Err(NsfError::Corrupt { note_id, reason }) => {
                    self.diagnostics
                        .warning(DiagnosticKind::CorruptNote, note_id.unwrap_or(NoteId(0)), reason);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(notes)
    }

    fn process(&mut self, location: &NoteLocation) -> Result<()> {
        let id = location.id;
        match location.class {
            NoteClass::Other(_) => {
                debug!("Skipping note {} ({})", id, location.class);
                Ok(())
            }
            NoteClass::Document if !self.options.include_documents => {
                trace!("Skipping document {}", id);
                Ok(())
            }
            class => {
                let Some(body) = self.body(location)? else {
                    return Ok(());
                };
                trace!("Note {} ({}): {} items", id, class, body.items.len());
                match class {
                    NoteClass::Form => self.build_form(id, &body),
                    NoteClass::View => self.build_view(id, &body),
                    NoteClass::Document => self.build_document(id, &body),
                    _ => self.build_acl(id, &body),
                }
            }
        }
    }

    /// Split a note into items. A note with unreadable timestamps is
    /// skipped; a note whose item table overruns it fails the parse.
    fn body(&mut self, location: &NoteLocation) -> Result<Option<NoteBody<'a>>> {
        let file: &'a [u8] = self.file;
        let bytes = &file[location.range.clone()];
        match items::parse_note(bytes, location.range.start as u64) {
            Ok(body) => Ok(Some(body)),
            Err(NsfError::Corrupt { reason, .. }) => {
                self.diagnostics.warning(DiagnosticKind::CorruptNote, location.id, reason);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn build_form(&mut self, id: NoteId, body: &NoteBody<'_>) -> Result<()> {
        let mut title = None;
        let mut description = None;
        let mut parent = None;
        let mut fields = Vec::new();

        for item in &body.items {
            if item.item_type() == Some(ItemType::FieldDefinition) {
                match design::field_definition(&item.name, item.value, item.value_offset) {
                    Ok(field) => fields.push(field),
                    Err(NsfError::Corrupt { reason, .. }) => self.corrupt_item(id, item, &reason),
                    Err(e) => return Err(e),
                }
                continue;
            }
            match Reserved::from_name(&item.name) {
                Some(Reserved::Title) => title = self.title(id, item)?,
                Some(Reserved::Comment) => description = self.text(id, item)?,
                Some(Reserved::ParentForm) => parent = self.note_ref(id, item)?,
                _ => trace!("Ignoring form item '{}'", item.name),
            }
        }

        let (name, aliases) = title.unwrap_or_else(|| (format!("Form_{}", id.0), Vec::new()));
        debug!("Form {} '{}': {} fields, parent {:?}", id, name, fields.len(), parent);
        self.forms.push(Form {
            id,
            name,
            aliases,
            description,
            fields,
            parent,
            created: body.created,
            modified: body.modified,
        });
        Ok(())
    }

    fn build_view(&mut self, id: NoteId, body: &NoteBody<'_>) -> Result<()> {
        let mut title = None;
        let mut selection_formula = None;
        let mut default_view = false;
        let mut columns = Vec::new();

        for item in &body.items {
            if item.item_type() == Some(ItemType::ViewColumn) {
                match design::column_definition(&item.name, item.value, item.value_offset) {
                    Ok(column) => columns.push(column),
                    Err(NsfError::Corrupt { reason, .. }) => self.corrupt_item(id, item, &reason),
                    Err(e) => return Err(e),
                }
                continue;
            }
            match Reserved::from_name(&item.name) {
                Some(Reserved::Title) => title = self.title(id, item)?,
                Some(Reserved::Formula) => selection_formula = self.text(id, item)?,
                Some(Reserved::DefaultView) => match self.value(id, item)? {
                    Some(FieldValue::Boolean(flag)) => default_view = flag,
                    Some(_) => self.wrong_type(id, item, "a boolean"),
                    None => {}
                },
                _ => trace!("Ignoring view item '{}'", item.name),
            }
        }

        let (name, aliases) = title.unwrap_or_else(|| (format!("View_{}", id.0), Vec::new()));
        debug!("View {} '{}': {} columns", id, name, columns.len());
        self.views.push(View {
            id,
            name,
            aliases,
            selection_formula,
            columns,
            default_view,
            created: body.created,
            modified: body.modified,
        });
        Ok(())
    }

    fn build_document(&mut self, id: NoteId, body: &NoteBody<'_>) -> Result<()> {
        let mut fields = BTreeMap::new();
        let mut form_id = None;
        let mut readers = Vec::new();

        for item in &body.items {
            if item.name.starts_with('$') {
                match Reserved::from_name(&item.name) {
                    Some(Reserved::FormRef) => form_id = self.note_ref(id, item)?,
                    Some(Reserved::Readers) => match self.value(id, item)? {
                        Some(FieldValue::TextList(names)) => readers = names,
                        Some(FieldValue::Text(name)) => readers = vec![name],
                        Some(_) => self.wrong_type(id, item, "a text list"),
                        None => {}
                    },
                    _ => trace!("Ignoring system item '{}'", item.name),
                }
                continue;
            }

            if fields.contains_key(&item.name) {
                self.diagnostics.warning(
                    DiagnosticKind::CorruptItem,
                    id,
                    format!("Duplicate item '{}', keeping the first", item.name),
                );
                continue;
            }

            let value = match item.item_type() {
                None => {
                    self.diagnostics.info(
                        DiagnosticKind::UnknownItemType,
                        id,
                        format!("Item '{}' has unknown type {:#06x}, kept raw", item.name, item.type_tag),
                    );
                    item.to_unknown()
                }
                Some(kind) if kind.is_design_record() => {
                    self.diagnostics.info(
                        DiagnosticKind::UnknownItemType,
                        id,
                        format!("Item '{}' is a design record inside a document, kept raw", item.name),
                    );
                    item.to_unknown()
                }
                Some(_) => self.value(id, item)?.unwrap_or_else(|| item.to_unknown()),
            };

            if let FieldValue::RichText(rich) = &value {
                if rich.lossy {
                    self.diagnostics.info(
                        DiagnosticKind::LossyRichText,
                        id,
                        format!("Rich text '{}' has content with no plain-text form", item.name),
                    );
                }
            }
            fields.insert(item.name.clone(), value);
        }

        let form = match form_id {
            Some(form_id) => Some(FormRef::Id(form_id)),
            None => fields
                .get(FORM_NAME_ITEM)
                .and_then(FieldValue::as_text)
                .map(|name| FormRef::Name(name.to_string())),
        };

        trace!("Document {}: {} fields, form {:?}", id, fields.len(), form);
        self.documents.push(Document {
            id,
            form,
            fields,
            readers,
            created: body.created,
            modified: body.modified,
        });
        Ok(())
    }

    fn build_acl(&mut self, id: NoteId, body: &NoteBody<'_>) -> Result<()> {
        for item in &body.items {
            if item.item_type() != Some(ItemType::AclEntry) {
                trace!("Ignoring ACL item '{}'", item.name);
                continue;
            }
            let entry = match design::acl_entry(&item.name, item.value) {
                Ok(entry) => entry,
                Err(NsfError::Corrupt { reason, .. }) => {
                    self.corrupt_item(id, item, &reason);
                    continue;
                }
                Err(e) => return Err(e),
            };
            if self.acl.iter().any(|e| e.principal == entry.principal) {
                self.diagnostics.warning(
                    DiagnosticKind::CorruptItem,
                    id,
                    format!("Duplicate ACL entry for '{}', keeping the first", entry.principal),
                );
                continue;
            }
            trace!("ACL: '{}' = {:?}", entry.principal, entry.level);
            self.acl.push(entry);
        }
        Ok(())
    }

    /// Report dangling parents and cut every parent-link cycle.
    ///
    /// Forms are visited in id order; each chain is followed until it ends,
    /// reaches a form already proven acyclic, or repeats a form on the
    /// current path. A repeat cuts the link that closed the loop, so each
    /// cycle yields exactly one diagnostic.
    fn check_inheritance(&mut self) {
        let index: BTreeMap<NoteId, usize> = self.forms.iter().enumerate().map(|(i, f)| (f.id, i)).collect();

        for form in &self.forms {
            if let Some(parent) = form.parent {
                if !index.contains_key(&parent) {
                    self.diagnostics.warning(
                        DiagnosticKind::BrokenInheritance,
                        form.id,
                        format!("Parent form {} of '{}' does not exist", parent, form.name),
                    );
                }
            }
        }

        let mut settled: HashSet<NoteId> = HashSet::new();
        for start in 0..self.forms.len() {
            let mut path: Vec<usize> = Vec::new();
            let mut on_path: HashSet<NoteId> = HashSet::new();
            let mut current = Some(start);

            while let Some(idx) = current {
                let id = self.forms[idx].id;
                if settled.contains(&id) {
                    break;
                }
                if !on_path.insert(id) {
                    if let Some(&last) = path.last() {
                        let form = &mut self.forms[last];
                        form.parent = None;
                        self.diagnostics.warning(
                            DiagnosticKind::BrokenInheritance,
                            form.id,
                            format!("Inheritance cycle through {}; parent link of '{}' removed", id, form.name),
                        );
                    }
                    break;
                }
                path.push(idx);
                current = self.forms[idx].parent.and_then(|p| index.get(&p).copied());
            }

            settled.extend(path.iter().map(|&i| self.forms[i].id));
        }
    }

    fn resolve_form_refs(&mut self) {
        for document in &self.documents {
            let Some(form_ref) = &document.form else {
                continue;
            };
            let resolved = match form_ref {
                FormRef::Id(id) => self.forms.binary_search_by_key(id, |f| f.id).is_ok(),
                FormRef::Name(name) => self.forms.iter().any(|f| f.answers_to(name)),
            };
            if !resolved {
                self.diagnostics.warning(
                    DiagnosticKind::UnresolvedFormRef,
                    document.id,
                    format!("Form {} does not exist", form_ref),
                );
            }
        }
    }

    /// Field names must be unique within a form (case-sensitive).
    fn validate(&self) -> Result<()> {
        for form in &self.forms {
            let mut seen = HashSet::new();
            for field in &form.fields {
                if !seen.insert(field.name.as_str()) {
                    return Err(NsfError::Malformed {
                        form: form.name.clone(),
                        name: field.name.clone(),
                        reason: "duplicate field name",
                    });
                }
            }
        }
        Ok(())
    }

    fn finish(self, header: &FileHeader, info: DatabaseInfo) -> (Application, Diagnostics) {
        let title = info.title.trim();
        let name = if !title.is_empty() {
            title.to_string()
        } else {
            self.options.name_hint.clone().unwrap_or_else(|| UNTITLED.to_string())
        };

        info!(
            "Assembled '{}': {} forms, {} views, {} documents, {} ACL entries, {} diagnostics",
            name,
            self.forms.len(),
            self.views.len(),
            self.documents.len(),
            self.acl.len(),
            self.diagnostics.len()
        );

        let application = Application {
            id: format!("{:016X}", info.replica_id),
            name,
            version: header.version,
            class: header.class,
            replica_id: info.replica_id,
            created: info.created,
            modified: info.modified,
            forms: self.forms,
            views: self.views,
            documents: self.documents,
            acl: self.acl,
        };
        (application, self.diagnostics)
    }

    /// Decode an item value; a corrupt value is reported and yields `None`.
    fn value(&mut self, id: NoteId, item: &RawItem<'_>) -> Result<Option<FieldValue>> {
        match items::decode_value(item) {
            Ok(value) => {
                trace!("Item '{}' in {}: {}", item.name, id, value.kind_name());
                Ok(Some(value))
            }
            Err(NsfError::Corrupt { reason, .. }) => {
                self.corrupt_item(id, item, &reason);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn text(&mut self, id: NoteId, item: &RawItem<'_>) -> Result<Option<String>> {
        Ok(match self.value(id, item)? {
            Some(FieldValue::Text(text)) | Some(FieldValue::Formula(text)) => Some(text).filter(|t| !t.is_empty()),
            Some(_) => {
                self.wrong_type(id, item, "text");
                None
            }
            None => None,
        })
    }

    /// `Name|Alias|Alias`, from a text or text-list item.
    fn title(&mut self, id: NoteId, item: &RawItem<'_>) -> Result<Option<(String, Vec<String>)>> {
        let parts: Vec<String> = match self.value(id, item)? {
            Some(FieldValue::Text(text)) => vec![text],
            Some(FieldValue::TextList(list)) => list,
            Some(_) => {
                self.wrong_type(id, item, "text");
                return Ok(None);
            }
            None => return Ok(None),
        };
        let mut names = parts
            .iter()
            .flat_map(|part| part.split('|'))
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(String::from);
        Ok(names.next().map(|name| (name, names.collect())))
    }

    fn note_ref(&mut self, id: NoteId, item: &RawItem<'_>) -> Result<Option<NoteId>> {
        Ok(match self.value(id, item)? {
            Some(FieldValue::Number(number)) => {
                match number.as_integer().and_then(|n| u32::try_from(n).ok()) {
                    Some(target) => Some(NoteId(target)),
                    None => {
                        self.wrong_type(id, item, "a note id");
                        None
                    }
                }
            }
            Some(_) => {
                self.wrong_type(id, item, "a note id");
                None
            }
            None => None,
        })
    }

    fn corrupt_item(&mut self, id: NoteId, item: &RawItem<'_>, reason: &str) {
        self.diagnostics.warning(
            DiagnosticKind::CorruptItem,
            id,
            format!("Item '{}' skipped: {}", item.name, reason),
        );
    }

    fn wrong_type(&mut self, id: NoteId, item: &RawItem<'_>, expected: &str) {
        self.diagnostics.warning(
            DiagnosticKind::CorruptItem,
            id,
            format!("Item '{}' should be {}, found type {:#06x}", item.name, expected, item.type_tag),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_names_ignore_case() {
        assert_eq!(Reserved::from_name("$TITLE"), Some(Reserved::Title));
        assert_eq!(Reserved::from_name("$title"), Some(Reserved::Title));
        assert_eq!(Reserved::from_name("$formref"), Some(Reserved::FormRef));
        assert_eq!(Reserved::from_name("Title"), None);
    }
}
