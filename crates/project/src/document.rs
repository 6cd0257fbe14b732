//! §6: the project file. Three sibling sections (`HardwareAdapters`,
//! `Instruments`, `Modules`), each a list of `Item` elements carrying
//! `Name`/`Category`/`ID` plus a `Params` child of `Field`s.
//!
//! This module is generic over the object trait each section's
//! [`ResourceManager`]/[`Library`] pair is built on (`dyn HardwareAdapter`,
//! `dyn Runnable` twice, one per category) — it never links against
//! `labcore-hardware`/`labcore-runnable` directly, since nothing it does
//! needs their concrete traits, only [`Object`]'s `base()`/`category()`.

use std::io::Cursor;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use labcore_error::Result;
use labcore_manager::ResourceManager;
use labcore_object::{Category, Configurator, ItemId, Library, Object, Params};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;

use crate::xml::{self, RawField, invalid_data};

/// The three resource managers a project's sections round-trip against.
pub struct ProjectManagers<'a, H: ?Sized + 'static, I: ?Sized + 'static, M: ?Sized + 'static> {
    pub hardware: &'a ResourceManager<H>,
    pub instruments: &'a ResourceManager<I>,
    pub modules: &'a ResourceManager<M>,
}

/// The three libraries project load resolves `Item`'s `Name` attribute
/// against (§4.7).
pub struct ProjectLibraries<'a, H: ?Sized + 'static, I: ?Sized + 'static, M: ?Sized + 'static> {
    pub hardware: &'a Library<H>,
    pub instruments: &'a Library<I>,
    pub modules: &'a Library<M>,
}

fn io_error(context: &str, err: std::io::Error) -> labcore_error::Error {
    invalid_data(format!("{context}: {err}"))
}

/// Serialize the three managers into one project XML document (§6).
pub fn save_project_to_string<H, I, M>(managers: &ProjectManagers<'_, H, I, M>) -> Result<String>
where
    H: Object + ?Sized + 'static,
    I: Object + ?Sized + 'static,
    M: Object + ?Sized + 'static,
{
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(|e| invalid_data(format!("writing XML declaration: {e}")))?;
    write_start(&mut writer, "Project", &[])?;
    write_section(&mut writer, "HardwareAdapters", managers.hardware)?;
    write_section(&mut writer, "Instruments", managers.instruments)?;
    write_section(&mut writer, "Modules", managers.modules)?;
    write_end(&mut writer, "Project")?;
    let bytes = writer.into_inner().into_inner();
    String::from_utf8(bytes).map_err(|e| invalid_data(format!("non-UTF8 project XML output: {e}")))
}

/// [`save_project_to_string`], written to `path`.
pub fn save_project_to_file<H, I, M>(path: &Path, managers: &ProjectManagers<'_, H, I, M>) -> Result<()>
where
    H: Object + ?Sized + 'static,
    I: Object + ?Sized + 'static,
    M: Object + ?Sized + 'static,
{
    let xml = save_project_to_string(managers)?;
    std::fs::write(path, xml).map_err(|e| io_error(&format!("writing project file {}", path.display()), e))
}

/// Deserialize a project XML document, instantiating every `Item` via the
/// matching [`Library`] and inserting it into the matching
/// [`ResourceManager`] (§4.7/§6). `ObjectLink` fields are stored as raw
/// target `ItemId`s only — link resolution happens later, outside this
/// crate, against the live managers.
pub fn load_project_from_str<H, I, M>(
    xml: &str,
    libraries: &ProjectLibraries<'_, H, I, M>,
    managers: &ProjectManagers<'_, H, I, M>,
) -> Result<()>
where
    H: Object + ?Sized + 'static,
    I: Object + ?Sized + 'static,
    M: Object + ?Sized + 'static,
{
    let parsed = parse_project(xml)?;
    apply_items(parsed.hardware, libraries.hardware, managers.hardware)?;
    apply_items(parsed.instruments, libraries.instruments, managers.instruments)?;
    apply_items(parsed.modules, libraries.modules, managers.modules)?;
    Ok(())
}

/// Construct and insert every parsed `Item` of one section. Missing `Params`
/// keys keep the `Configurator`'s default (§4.2); keys the target `Params`
/// doesn't recognize are discarded with a warning (§6) rather than failing
/// the whole load.
fn apply_items<T>(items: Vec<ParsedItem>, library: &Library<T>, manager: &ResourceManager<T>) -> Result<()>
where
    T: Object + ?Sized + 'static,
{
    for item in items {
        let entry = library.find(&item.library_name)?;
        let mut params = entry.configurator.make_params();
        for (key, value) in item.fields {
            if params.spec(&key).is_err() {
                tracing::warn!(key = %key, item = %item.library_name, "discarding unrecognized project field");
                continue;
            }
            params.set(&key, value)?;
        }
        let stored_params = Arc::new(params.clone());
        let object = library.instantiate(&item.library_name, item.id, params)?;
        if let Some(name) = &item.object_name {
            object.base().set_object_name(name.clone());
        }
        manager.insert_resource(item.id, item.library_name.clone(), stored_params, object);
    }
    Ok(())
}

/// [`load_project_from_str`], read from `path`.
pub fn load_project_from_file<H, I, M>(
    path: &Path,
    libraries: &ProjectLibraries<'_, H, I, M>,
    managers: &ProjectManagers<'_, H, I, M>,
) -> Result<()>
where
    H: Object + ?Sized + 'static,
    I: Object + ?Sized + 'static,
    M: Object + ?Sized + 'static,
{
    let xml = std::fs::read_to_string(path)
        .map_err(|e| io_error(&format!("reading project file {}", path.display()), e))?;
    load_project_from_str(&xml, libraries, managers)
}

fn write_start(writer: &mut Writer<Cursor<Vec<u8>>>, name: &str, attrs: &[(&str, &str)]) -> Result<()> {
    let mut start = BytesStart::new(name);
    for (key, value) in attrs {
        start.push_attribute((*key, *value));
    }
    writer
        .write_event(Event::Start(start))
        .map_err(|e| invalid_data(format!("writing <{name}>: {e}")))
}

fn write_end(writer: &mut Writer<Cursor<Vec<u8>>>, name: &str) -> Result<()> {
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .map_err(|e| invalid_data(format!("closing </{name}>: {e}")))
}

fn write_section<T>(writer: &mut Writer<Cursor<Vec<u8>>>, section: &str, manager: &ResourceManager<T>) -> Result<()>
where
    T: Object + ?Sized + 'static,
{
    write_start(writer, section, &[])?;
    for (id, library_name, params) in manager.entries_snapshot() {
        let Some(object) = manager.get_resource(id) else {
            continue;
        };
        write_item(writer, id, object.category(), &library_name, &object.object_name(), &params)?;
    }
    write_end(writer, section)?;
    Ok(())
}

fn write_item(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    id: ItemId,
    category: Category,
    library_name: &str,
    object_name: &str,
    params: &Params,
) -> Result<()> {
    let id_str = id.get().to_string();
    let category_str = category.to_string();
    let mut attrs = vec![("Name", library_name), ("Category", category_str.as_str()), ("ID", id_str.as_str())];
    if !object_name.is_empty() {
        attrs.push(("ObjectName", object_name));
    }
    write_start(writer, "Item", &attrs)?;
    write_start(writer, "Params", &[])?;
    for key in params.keys()? {
        let value = params.get(&key)?;
        xml::write_field(writer, &key, &value)?;
    }
    write_end(writer, "Params")?;
    write_end(writer, "Item")?;
    Ok(())
}

struct ParsedItem {
    id: ItemId,
    library_name: String,
    object_name: Option<String>,
    fields: Vec<(String, labcore_object::FieldValue)>,
}

#[derive(Default)]
struct ParsedProject {
    hardware: Vec<ParsedItem>,
    instruments: Vec<ParsedItem>,
    modules: Vec<ParsedItem>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Hardware,
    Instruments,
    Modules,
}

fn attr_text(start: &BytesStart<'_>, name: &str) -> Result<Option<String>> {
    for attr in start.attributes() {
        let attr = attr.map_err(|e| invalid_data(format!("malformed attribute on <{}>: {e}", String::from_utf8_lossy(start.name().as_ref()))))?;
        if attr.key.as_ref() == name.as_bytes() {
            let value = attr
                .unescape_value()
                .map_err(|e| invalid_data(format!("malformed attribute value for '{name}': {e}")))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn require_attr(start: &BytesStart<'_>, name: &str) -> Result<String> {
    attr_text(start, name)?.ok_or_else(|| {
        invalid_data(format!(
            "<{}> is missing required attribute '{name}'",
            String::from_utf8_lossy(start.name().as_ref())
        ))
    })
}

fn expected_category(section: Section) -> Option<Category> {
    match section {
        Section::Hardware => Some(Category::HardwareAdapter),
        Section::Instruments => Some(Category::Instrument),
        Section::Modules => Some(Category::Module),
        Section::None => None,
    }
}

fn start_item(start: &BytesStart<'_>, section: Section) -> Result<ParsedItem> {
    let id_text = require_attr(start, "ID")?;
    let id = id_text
        .parse::<u64>()
        .map(ItemId::new)
        .map_err(|_| invalid_data(format!("Item ID '{id_text}' is not a decimal integer")))?;
    let library_name = require_attr(start, "Name")?;
    let category_text = require_attr(start, "Category")?;
    let category = Category::from_str(&category_text)
        .map_err(|_| invalid_data(format!("Item Category '{category_text}' is not recognized")))?;
    if expected_category(section) != Some(category) {
        return Err(invalid_data(format!(
            "Item '{library_name}' has Category '{category_text}' but appears in the wrong section"
        )));
    }
    Ok(ParsedItem {
        id,
        library_name,
        object_name: attr_text(start, "ObjectName")?,
        fields: Vec::new(),
    })
}

fn start_field(start: &BytesStart<'_>) -> Result<RawField> {
    Ok(RawField {
        key: require_attr(start, "key")?,
        kind: require_attr(start, "kind")?,
        capability: attr_text(start, "capability")?,
        text: String::new(),
    })
}

/// Scan a project XML document into per-section lists of raw `Item`
/// records, without touching any [`Library`] or [`ResourceManager`] yet.
fn parse_project(xml: &str) -> Result<ParsedProject> {
    let mut reader = Reader::from_str(xml);
    let mut project = ParsedProject::default();

    let mut section = Section::None;
    let mut current_item: Option<ParsedItem> = None;
    let mut current_field: Option<RawField> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| invalid_data(format!("malformed project XML: {e}")))?;
        match event {
            Event::Eof => break,
            Event::Start(start) => {
                on_open(&start, &mut section, &mut current_item, &mut current_field)?;
            }
            Event::Empty(start) => {
                on_open(&start, &mut section, &mut current_item, &mut current_field)?;
                on_close(
                    &start.name().as_ref().to_vec(),
                    &mut project,
                    &mut section,
                    &mut current_item,
                    &mut current_field,
                )?;
            }
            Event::End(end) => {
                on_close(
                    &end.name().as_ref().to_vec(),
                    &mut project,
                    &mut section,
                    &mut current_item,
                    &mut current_field,
                )?;
            }
            Event::Text(text) => {
                if let Some(field) = current_field.as_mut() {
                    let decoded = text
                        .unescape()
                        .map_err(|e| invalid_data(format!("malformed text content: {e}")))?;
                    field.text.push_str(&decoded);
                }
            }
            _ => {}
        }
    }

    Ok(project)
}

fn on_open(
    start: &BytesStart<'_>,
    section: &mut Section,
    current_item: &mut Option<ParsedItem>,
    current_field: &mut Option<RawField>,
) -> Result<()> {
    match start.name().as_ref() {
        b"HardwareAdapters" => *section = Section::Hardware,
        b"Instruments" => *section = Section::Instruments,
        b"Modules" => *section = Section::Modules,
        b"Item" => *current_item = Some(start_item(start, *section)?),
        b"Field" => *current_field = Some(start_field(start)?),
        _ => {}
    }
    Ok(())
}

fn on_close(
    name: &[u8],
    project: &mut ParsedProject,
    section: &mut Section,
    current_item: &mut Option<ParsedItem>,
    current_field: &mut Option<RawField>,
) -> Result<()> {
    match name {
        b"HardwareAdapters" | b"Instruments" | b"Modules" => *section = Section::None,
        b"Item" => {
            if let Some(item) = current_item.take() {
                match section {
                    Section::Hardware => project.hardware.push(item),
                    Section::Instruments => project.instruments.push(item),
                    Section::Modules => project.modules.push(item),
                    Section::None => {
                        return Err(invalid_data("Item element outside of any known section"));
                    }
                }
            }
        }
        b"Field" => {
            if let Some(field) = current_field.take() {
                let key = field.key.clone();
                let value = field.into_value()?;
                if let Some(item) = current_item.as_mut() {
                    item.fields.push((key, value));
                }
            }
        }
        _ => {}
    }
    Ok(())
}
