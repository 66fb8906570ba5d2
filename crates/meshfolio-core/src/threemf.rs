//! 3MF package reading
//!
//! A 3MF file is a ZIP container following the Open Packaging Conventions.
//! The root model part is located through `_rels/.rels`; further model parts
//! are pulled in when components or build items reference them with the
//! production extension's `p:path` attribute.

use glam::{Mat4, Vec4};
use quick_xml::de::from_str;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Deserialize;
use std::collections::{HashMap, VecDeque};
use std::io::{Cursor, Read};
use thiserror::Error;
use zip::ZipArchive;

/// Root model part location used when `_rels/.rels` is missing
pub const DEFAULT_MODEL_PATH: &str = "/3D/3dmodel.model";

const RELS_PATH: &str = "_rels/.rels";
const MODEL_REL_TYPE_SUFFIX: &str = "/3dmodel";

const MATERIAL_NS: &str = "http://schemas.microsoft.com/3dmanufacturing/material/2015/02";
const PRODUCTION_NS: &str = "http://schemas.microsoft.com/3dmanufacturing/production/2015/06";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ThreeMfError {
    #[error("Not a readable 3MF archive: {0}")]
    Archive(String),
    #[error("Missing package part: {0}")]
    MissingPart(String),
    #[error("Failed to parse {part}: {reason}")]
    Xml { part: String, reason: String },
    #[error("Invalid transform {0:?}")]
    BadTransform(String),
    #[error("Object {id} not found in {part}")]
    MissingObject { part: String, id: u32 },
    #[error("Object {object} triangle {triangle} references vertex {index} but only {count} exist")]
    BadIndex {
        object: u32,
        triangle: usize,
        index: u32,
        count: usize,
    },
    #[error("Unsupported required extension: {0}")]
    UnsupportedExtension(String),
    #[error("Component cycle through object {0}")]
    ComponentCycle(u32),
}

#[derive(Debug, Deserialize)]
struct Relationships {
    #[serde(rename = "Relationship", default)]
    relationships: Vec<Relationship>,
}

#[derive(Debug, Deserialize)]
struct Relationship {
    #[serde(rename = "@Target")]
    target: String,
    #[serde(rename = "@Type", default)]
    kind: String,
}

/// `<model>` element of a model part
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelXml {
    #[serde(rename = "@unit", default)]
    pub unit: Option<String>,
    #[serde(rename = "@requiredextensions", default)]
    pub required_extensions: Option<String>,
    #[serde(default)]
    pub metadata: Vec<MetadataXml>,
    #[serde(default)]
    pub resources: ResourcesXml,
    #[serde(default)]
    pub build: BuildXml,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetadataXml {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "$text", default)]
    pub value: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResourcesXml {
    #[serde(rename = "object", default)]
    pub objects: Vec<ObjectXml>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObjectXml {
    #[serde(rename = "@id")]
    pub id: u32,
    #[serde(rename = "@name", default)]
    pub name: Option<String>,
    #[serde(rename = "@type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub mesh: Option<MeshXml>,
    #[serde(default)]
    pub components: Option<ComponentsXml>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MeshXml {
    #[serde(default)]
    pub vertices: VerticesXml,
    #[serde(default)]
    pub triangles: TrianglesXml,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VerticesXml {
    #[serde(rename = "vertex", default)]
    pub vertex: Vec<VertexXml>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct VertexXml {
    #[serde(rename = "@x")]
    pub x: f32,
    #[serde(rename = "@y")]
    pub y: f32,
    #[serde(rename = "@z")]
    pub z: f32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrianglesXml {
    #[serde(rename = "triangle", default)]
    pub triangle: Vec<TriangleXml>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TriangleXml {
    #[serde(rename = "@v1")]
    pub v1: u32,
    #[serde(rename = "@v2")]
    pub v2: u32,
    #[serde(rename = "@v3")]
    pub v3: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ComponentsXml {
    #[serde(rename = "component", default)]
    pub component: Vec<ComponentXml>,
}

/// Reference to another object, optionally in another model part
#[derive(Debug, Clone, Deserialize)]
pub struct ComponentXml {
    #[serde(rename = "@objectid")]
    pub object_id: u32,
    #[serde(rename = "@transform", default)]
    pub transform: Option<String>,
    /// Production extension `p:path`
    #[serde(rename = "@path", default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BuildXml {
    #[serde(rename = "item", default)]
    pub items: Vec<ItemXml>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ItemXml {
    #[serde(rename = "@objectid")]
    pub object_id: u32,
    #[serde(rename = "@transform", default)]
    pub transform: Option<String>,
    /// Production extension `p:path`
    #[serde(rename = "@path", default)]
    pub path: Option<String>,
}

impl ModelXml {
    /// Parse a model part from XML
    pub fn from_xml(xml: &str) -> Result<Self, quick_xml::DeError> {
        from_str(xml)
    }

    pub fn object(&self, id: u32) -> Option<&ObjectXml> {
        self.resources.objects.iter().find(|o| o.id == id)
    }

    /// Value of a `<metadata name=..>` entry
    pub fn metadata_value(&self, name: &str) -> Option<&str> {
        self.metadata
            .iter()
            .find(|m| m.name.eq_ignore_ascii_case(name))
            .map(|m| m.value.trim())
            .filter(|v| !v.is_empty())
    }
}

/// Parsed 3MF package: the root model part plus every part it references
#[derive(Debug, Clone)]
pub struct Package {
    root_path: String,
    parts: HashMap<String, ModelXml>,
}

impl Package {
    /// Read a package from the raw bytes of a `.3mf` file
    pub fn read(bytes: &[u8]) -> Result<Self, ThreeMfError> {
        let mut archive =
            ZipArchive::new(Cursor::new(bytes)).map_err(|e| ThreeMfError::Archive(e.to_string()))?;

        let root_path = find_root_model_path(&mut archive)?;
        let mut parts = HashMap::new();
        let mut queue = VecDeque::from([root_path.clone()]);

        while let Some(path) = queue.pop_front() {
            if parts.contains_key(&path) {
                continue;
            }

            let xml = read_part(&mut archive, &path)?;
            let model = ModelXml::from_xml(&xml).map_err(|e| ThreeMfError::Xml {
                part: path.clone(),
                reason: e.to_string(),
            })?;

            if let Some(required) = &model.required_extensions {
                check_required_extensions(&path, &xml, required)?;
            }

            let referenced = model
                .build
                .items
                .iter()
                .filter_map(|i| i.path.as_deref())
                .chain(model.resources.objects.iter().flat_map(|o| {
                    o.components
                        .iter()
                        .flat_map(|c| c.component.iter().filter_map(|c| c.path.as_deref()))
                }))
                .map(normalize_part_path);
            queue.extend(referenced);

            tracing::debug!(
                part = %path,
                objects = model.resources.objects.len(),
                items = model.build.items.len(),
                "Parsed 3MF model part"
            );
            parts.insert(path, model);
        }

        Ok(Self { root_path, parts })
    }

    pub fn root_path(&self) -> &str {
        &self.root_path
    }

    pub fn root(&self) -> &ModelXml {
        // The root part is always inserted by `read`
        &self.parts[&self.root_path]
    }

    /// Look up a model part by its package path (leading `/` optional)
    pub fn part(&self, path: &str) -> Option<&ModelXml> {
        self.parts.get(&normalize_part_path(path))
    }

    /// Resolve an object reference made from `from_part`
    pub fn resolve_object(
        &self,
        from_part: &str,
        path: Option<&str>,
        id: u32,
    ) -> Result<(String, &ObjectXml), ThreeMfError> {
        let part_path = path.map(normalize_part_path).unwrap_or_else(|| from_part.to_string());
        let model = self
            .parts
            .get(&part_path)
            .ok_or_else(|| ThreeMfError::MissingPart(part_path.clone()))?;
        let object = model.object(id).ok_or_else(|| ThreeMfError::MissingObject {
            part: part_path.clone(),
            id,
        })?;
        Ok((part_path, object))
    }
}

/// Normalize a package part path to the `/dir/name` form
pub fn normalize_part_path(path: &str) -> String {
    format!("/{}", path.trim().trim_start_matches('/'))
}

/// Parse a 3MF `transform` attribute
///
/// 3MF matrices are 4x3, row-major, applied to row vectors; the last three
/// values are the translation.
pub fn parse_transform(text: &str) -> Result<Mat4, ThreeMfError> {
    let bad = || ThreeMfError::BadTransform(text.to_string());
    let values = text
        .split_whitespace()
        .map(|s| s.parse::<f32>().map_err(|_| bad()))
        .collect::<Result<Vec<_>, _>>()?;
    let m: [f32; 12] = values.try_into().map_err(|_| bad())?;
    if m.iter().any(|v| !v.is_finite()) {
        return Err(bad());
    }

    Ok(Mat4::from_cols(
        Vec4::new(m[0], m[1], m[2], 0.0),
        Vec4::new(m[3], m[4], m[5], 0.0),
        Vec4::new(m[6], m[7], m[8], 0.0),
        Vec4::new(m[9], m[10], m[11], 1.0),
    ))
}

fn find_root_model_path<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
) -> Result<String, ThreeMfError> {
    let Some(entry) = find_entry(archive, RELS_PATH) else {
        tracing::debug!("No {} in package, using {}", RELS_PATH, DEFAULT_MODEL_PATH);
        return Ok(DEFAULT_MODEL_PATH.to_string());
    };

    let xml = read_entry(archive, &entry)?;
    let rels: Relationships = from_str(&xml).map_err(|e| ThreeMfError::Xml {
        part: RELS_PATH.to_string(),
        reason: e.to_string(),
    })?;

    Ok(rels
        .relationships
        .iter()
        .find(|r| r.kind.ends_with(MODEL_REL_TYPE_SUFFIX))
        .map(|r| normalize_part_path(&r.target))
        .unwrap_or_else(|| DEFAULT_MODEL_PATH.to_string()))
}

/// Find a ZIP entry by part path, falling back to a case-insensitive match
fn find_entry<R: Read + std::io::Seek>(archive: &ZipArchive<R>, path: &str) -> Option<String> {
    let wanted = path.trim_start_matches('/');
    archive
        .file_names()
        .find(|name| *name == wanted)
        .or_else(|| archive.file_names().find(|name| name.eq_ignore_ascii_case(wanted)))
        .map(str::to_string)
}

fn read_part<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    path: &str,
) -> Result<String, ThreeMfError> {
    let entry = find_entry(archive, path).ok_or_else(|| ThreeMfError::MissingPart(path.to_string()))?;
    read_entry(archive, &entry)
}

fn read_entry<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    entry: &str,
) -> Result<String, ThreeMfError> {
    let mut file = archive
        .by_name(entry)
        .map_err(|e| ThreeMfError::Archive(e.to_string()))?;
    let mut content = String::new();
    file.read_to_string(&mut content)
        .map_err(|e| ThreeMfError::Archive(format!("{}: {}", entry, e)))?;
    Ok(content)
}

/// Reject parts whose `requiredextensions` name anything beyond materials and production
fn check_required_extensions(part: &str, xml: &str, required: &str) -> Result<(), ThreeMfError> {
    let namespaces = namespace_bindings(xml).map_err(|reason| ThreeMfError::Xml {
        part: part.to_string(),
        reason,
    })?;

    for prefix in required.split_whitespace() {
        let uri = namespaces.get(prefix).map(String::as_str).unwrap_or(prefix);
        if uri != MATERIAL_NS && uri != PRODUCTION_NS {
            return Err(ThreeMfError::UnsupportedExtension(uri.to_string()));
        }
    }
    Ok(())
}

/// Collect `xmlns:prefix` bindings declared on the `<model>` element
fn namespace_bindings(xml: &str) -> Result<HashMap<String, String>, String> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event().map_err(|e| e.to_string())? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"model" => {
                let mut bindings = HashMap::new();
                for attr in e.attributes() {
                    let attr = attr.map_err(|e| e.to_string())?;
                    let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
                    if let Some(prefix) = key.strip_prefix("xmlns:") {
                        let value = attr.unescape_value().map_err(|e| e.to_string())?;
                        bindings.insert(prefix.to_string(), value.into_owned());
                    }
                }
                return Ok(bindings);
            }
            Event::Eof => return Ok(HashMap::new()),
            _ => {}
        }
    }
}
