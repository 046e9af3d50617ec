//! Binary glTF (GLB) tile documents.
//!
//! Tiles arrive as GLB files: a 12-byte header followed by a JSON chunk and an
//! optional binary chunk. The container is handled by [`gltf::Glb`] and the
//! document is validated and resolved through [`gltf::Document`]. The JSON is
//! also kept as an untyped [`serde_json::Value`] so that everything alignment
//! does not touch (materials, textures, extensions, extras) survives a
//! read/write cycle unchanged, and node transforms keep full `f64` precision.
//!
//! Exposed to frame alignment:
//!
//! - node translation and rotation, from TRS properties or a `matrix`
//! - uncompressed `FLOAT`/`VEC3` `POSITION` accessors stored in the GLB buffer
//! - root-level `extras` for persisted metadata
//! - the asset copyright string
//!
//! Compressed geometry (`KHR_draco_mesh_compression`) and sparse accessors
//! are reported as [`GlbError::Unsupported`].
//!
//! ```text
//! ┌────────────┬──────────────────────────┬───────────────────────────┐
//! │ header 12B │ len | "JSON" | json bytes │ len | "BIN\0" | bin bytes │
//! └────────────┴──────────────────────────┴───────────────────────────┘
//! ```

use std::borrow::Cow;

use glam::{DMat4, DQuat, DVec3};
use gltf::accessor::{Accessor, DataType, Dimensions};
use gltf::buffer::{Buffer, Source};
use gltf::mesh::Semantic;
use gltf::Glb;
use serde_json::{json, Value};
use thiserror::Error;

const GLB_MAGIC: [u8; 4] = *b"glTF";
const GLB_VERSION: u32 = 2;
const HEADER_LEN: usize = 12;
const CHUNK_HEADER_LEN: usize = 8;
const VEC3_BYTES: usize = 12;

const DRACO_EXTENSION: &str = "KHR_draco_mesh_compression";

/// Errors raised while decoding or editing a GLB asset.
#[derive(Debug, Error)]
pub enum GlbError {
    /// Container or document rejected by the glTF reader.
    #[error("invalid glTF: {0}")]
    Gltf(#[from] gltf::Error),

    /// Accessor data reaches past the buffer that should hold it.
    #[error("truncated GLB: {0}")]
    Truncated(String),

    /// The JSON chunk is not a glTF object.
    #[error("invalid GLB JSON chunk: {0}")]
    Json(String),

    /// An index points at nothing valid.
    #[error("invalid reference: {0}")]
    InvalidReference(String),

    /// Valid glTF this codec does not handle.
    #[error("unsupported glTF feature: {0}")]
    Unsupported(String),
}

/// A decoded GLB asset: glTF JSON plus the embedded binary buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct GlbDocument {
    json: Value,
    bin: Vec<u8>,
}

impl GlbDocument {
    /// Builds a document from its JSON and binary buffer.
    pub fn from_parts(json: Value, bin: Vec<u8>) -> Self {
        Self { json, bin }
    }

    /// Decodes and validates a GLB byte stream.
    ///
    /// Every `POSITION` accessor must resolve to data inside the GLB buffer,
    /// so a document that parses can always be aligned.
    pub fn parse(data: &[u8]) -> Result<Self, GlbError> {
        let glb = Glb::from_slice(data)?;

        let json: Value =
            serde_json::from_slice(&glb.json).map_err(|e| GlbError::Json(e.to_string()))?;
        if !json.is_object() {
            return Err(GlbError::Json("top-level value is not an object".to_string()));
        }

        let document = Self {
            json,
            bin: glb.bin.map(Cow::into_owned).unwrap_or_default(),
        };

        let typed = document.typed()?;
        for mesh in typed.meshes() {
            for accessor in document.mesh_position_accessors(&typed, mesh.index())? {
                document.position_layout(&accessor)?;
            }
        }

        Ok(document)
    }

    /// Encodes the document as a GLB byte stream.
    pub fn to_bytes(&self) -> Result<Vec<u8>, GlbError> {
        let json = serde_json::to_vec(&self.json).map_err(|e| GlbError::Json(e.to_string()))?;

        let mut length = HEADER_LEN + CHUNK_HEADER_LEN + padded(json.len());
        if !self.bin.is_empty() {
            length += CHUNK_HEADER_LEN + padded(self.bin.len());
        }
        let length = u32::try_from(length)
            .map_err(|_| GlbError::Unsupported(format!("GLB of {} bytes", length)))?;

        let glb = Glb {
            header: gltf::binary::Header {
                magic: GLB_MAGIC,
                version: GLB_VERSION,
                length,
            },
            json: Cow::Owned(json),
            bin: (!self.bin.is_empty()).then(|| Cow::Borrowed(self.bin.as_slice())),
        };
        Ok(glb.to_vec()?)
    }

    /// Returns the glTF JSON.
    pub fn json(&self) -> &Value {
        &self.json
    }

    /// Returns the embedded binary buffer.
    pub fn bin(&self) -> &[u8] {
        &self.bin
    }

    /// Returns the asset copyright, if declared.
    pub fn copyright(&self) -> Option<&str> {
        self.json.pointer("/asset/copyright").and_then(Value::as_str)
    }

    fn nodes(&self) -> &[Value] {
        self.json
            .get("nodes")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Returns the indices of all nodes that carry a translation, either as
    /// a `translation` property or inside a `matrix`.
    pub fn translated_nodes(&self) -> Vec<usize> {
        (0..self.nodes().len())
            .filter(|&i| self.node_translation(i).is_some())
            .collect()
    }

    /// Returns a node's translation.
    pub fn node_translation(&self, node: usize) -> Option<DVec3> {
        let node = self.nodes().get(node)?;
        vec3_from_value(node.get("translation"))
            .or_else(|| matrix_from_value(node.get("matrix")).map(|m| m.w_axis.truncate()))
    }

    /// Returns a node's rotation, if it declares one.
    pub fn node_rotation(&self, node: usize) -> Option<DQuat> {
        let node = self.nodes().get(node)?;
        match node.get("rotation") {
            Some(rotation) => {
                let values = rotation.as_array()?;
                if values.len() != 4 {
                    return None;
                }
                let mut q = [0.0; 4];
                for (slot, v) in q.iter_mut().zip(values) {
                    *slot = v.as_f64()?;
                }
                Some(DQuat::from_xyzw(q[0], q[1], q[2], q[3]))
            }
            None => decompose(&matrix_from_value(node.get("matrix"))?).map(|(_, r, _)| r),
        }
    }

    /// Returns the mesh index referenced by a node.
    pub fn node_mesh(&self, node: usize) -> Option<usize> {
        self.nodes()
            .get(node)?
            .get("mesh")?
            .as_u64()
            .map(|m| m as usize)
    }

    /// Returns a node's JSON object with any `matrix` replaced by the
    /// equivalent `translation`, `rotation` and `scale`.
    fn node_trs_mut(&mut self, node: usize) -> Result<&mut serde_json::Map<String, Value>, GlbError> {
        let map = self
            .json
            .get_mut("nodes")
            .and_then(Value::as_array_mut)
            .and_then(|nodes| nodes.get_mut(node))
            .and_then(Value::as_object_mut)
            .ok_or_else(|| GlbError::InvalidReference(format!("node {}", node)))?;

        if let Some(value) = map.remove("matrix") {
            let matrix = matrix_from_value(Some(&value)).ok_or_else(|| {
                GlbError::InvalidReference(format!("node {} matrix is not 16 numbers", node))
            })?;

            map.insert(
                "translation".to_string(),
                json!(matrix.w_axis.truncate().to_array()),
            );
            if let Some((scale, rotation, _)) = decompose(&matrix) {
                map.insert("rotation".to_string(), json!(rotation.to_array()));
                if !scale.abs_diff_eq(DVec3::ONE, 1e-12) {
                    map.insert("scale".to_string(), json!(scale.to_array()));
                }
            }
        }

        Ok(map)
    }

    /// Sets a node's translation.
    pub fn set_node_translation(&mut self, node: usize, t: DVec3) -> Result<(), GlbError> {
        self.node_trs_mut(node)?
            .insert("translation".to_string(), json!([t.x, t.y, t.z]));
        Ok(())
    }

    /// Sets a node's rotation quaternion.
    pub fn set_node_rotation(&mut self, node: usize, q: DQuat) -> Result<(), GlbError> {
        self.node_trs_mut(node)?
            .insert("rotation".to_string(), json!([q.x, q.y, q.z, q.w]));
        Ok(())
    }

    /// Returns the `POSITION` accessor of every primitive of a mesh, each
    /// accessor listed once.
    pub fn position_accessors(&self, mesh: usize) -> Result<Vec<usize>, GlbError> {
        let typed = self.typed()?;
        Ok(self
            .mesh_position_accessors(&typed, mesh)?
            .iter()
            .map(Accessor::index)
            .collect())
    }

    /// Reads the vertex positions of a `POSITION` accessor.
    pub fn read_positions(&self, accessor: usize) -> Result<Vec<[f32; 3]>, GlbError> {
        let typed = self.typed()?;
        self.read_accessor(accessor_at(&typed, accessor)?)
    }

    /// Overwrites the vertex positions of a `POSITION` accessor in place and
    /// refreshes its `min`/`max` bounds.
    pub fn write_positions(
        &mut self,
        accessor: usize,
        positions: &[[f32; 3]],
    ) -> Result<(), GlbError> {
        let typed = self.typed()?;
        let layout = self.position_layout(&accessor_at(&typed, accessor)?)?;
        self.store_positions(accessor, layout, positions)
    }

    /// Replaces every `POSITION` vertex of a mesh with `f(vertex)`.
    pub fn transform_mesh_positions<F>(&mut self, mesh: usize, f: F) -> Result<(), GlbError>
    where
        F: Fn([f32; 3]) -> [f32; 3],
    {
        let typed = self.typed()?;

        let mut updates = Vec::new();
        for accessor in self.mesh_position_accessors(&typed, mesh)? {
            let index = accessor.index();
            let layout = self.position_layout(&accessor)?;
            let positions: Vec<[f32; 3]> =
                self.read_accessor(accessor)?.into_iter().map(&f).collect();
            updates.push((index, layout, positions));
        }

        for (index, layout, positions) in updates {
            self.store_positions(index, layout, &positions)?;
        }
        Ok(())
    }

    /// Reads a 3-vector stored under `extras.<key>` at the document root.
    pub fn extras_vec3(&self, key: &str) -> Option<DVec3> {
        vec3_from_value(self.json.get("extras").and_then(|e| e.get(key)))
    }

    /// Stores a 3-vector under `extras.<key>` at the document root, keeping
    /// any other extras.
    pub fn set_extras_vec3(&mut self, key: &str, v: DVec3) {
        let Some(root) = self.json.as_object_mut() else {
            return;
        };
        let extras = root
            .entry("extras")
            .or_insert_with(|| Value::Object(Default::default()));
        if !extras.is_object() {
            *extras = Value::Object(Default::default());
        }
        if let Some(map) = extras.as_object_mut() {
            map.insert(key.to_string(), json!([v.x, v.y, v.z]));
        }
    }

    /// Validated, typed view of the current JSON.
    fn typed(&self) -> Result<gltf::Document, GlbError> {
        let root: gltf::json::Root =
            serde_json::from_value(self.json.clone()).map_err(|e| GlbError::Json(e.to_string()))?;
        Ok(gltf::Document::from_json(root)?)
    }

    fn mesh_position_accessors<'a>(
        &self,
        typed: &'a gltf::Document,
        mesh: usize,
    ) -> Result<Vec<Accessor<'a>>, GlbError> {
        let mesh = typed
            .meshes()
            .nth(mesh)
            .ok_or_else(|| GlbError::InvalidReference(format!("mesh {}", mesh)))?;

        let mut accessors: Vec<Accessor<'a>> = Vec::new();
        for primitive in mesh.primitives() {
            let extension = format!(
                "/meshes/{}/primitives/{}/extensions/{}",
                mesh.index(),
                primitive.index(),
                DRACO_EXTENSION
            );
            if self.json.pointer(&extension).is_some() {
                return Err(GlbError::Unsupported(format!(
                    "mesh {} primitive {} uses {}",
                    mesh.index(),
                    primitive.index(),
                    DRACO_EXTENSION
                )));
            }
            if let Some(accessor) = primitive.get(&Semantic::Positions) {
                if !accessors.iter().any(|a| a.index() == accessor.index()) {
                    accessors.push(accessor);
                }
            }
        }
        Ok(accessors)
    }

    fn buffer_data(&self, buffer: Buffer<'_>) -> Option<&[u8]> {
        match buffer.source() {
            Source::Bin => Some(self.bin.as_slice()),
            Source::Uri(_) => None,
        }
    }

    fn read_accessor(&self, accessor: Accessor<'_>) -> Result<Vec<[f32; 3]>, GlbError> {
        let layout = self.position_layout(&accessor)?;
        if layout.count == 0 {
            return Ok(Vec::new());
        }

        let index = accessor.index();
        let iter = gltf::accessor::Iter::<[f32; 3]>::new(accessor, |buffer| {
            self.buffer_data(buffer)
        })
        .ok_or_else(|| GlbError::Truncated(format!("accessor {} data", index)))?;
        Ok(iter.collect())
    }

    /// Resolves where an accessor's vectors live in the binary buffer.
    ///
    /// All offsets come from untrusted input and are checked before any
    /// reader touches the buffer.
    fn position_layout(&self, accessor: &Accessor<'_>) -> Result<Vec3Layout, GlbError> {
        let index = accessor.index();

        if accessor.sparse().is_some() {
            return Err(GlbError::Unsupported(format!("sparse accessor {}", index)));
        }
        if accessor.data_type() != DataType::F32 || accessor.dimensions() != Dimensions::Vec3 {
            return Err(GlbError::Unsupported(format!(
                "accessor {} is not FLOAT VEC3",
                index
            )));
        }

        let view = accessor.view().ok_or_else(|| {
            GlbError::Unsupported(format!("accessor {} has no buffer view", index))
        })?;
        if !matches!(view.buffer().source(), Source::Bin) {
            return Err(GlbError::Unsupported(format!(
                "bufferView {} is not stored in the GLB buffer",
                view.index()
            )));
        }

        let stride = view.stride().unwrap_or(VEC3_BYTES);
        if stride < VEC3_BYTES {
            return Err(GlbError::InvalidReference(format!(
                "bufferView {} stride {} is smaller than a VEC3",
                view.index(),
                stride
            )));
        }

        let out_of_range =
            || GlbError::Truncated(format!("accessor {} reaches past its buffer view", index));

        let view_end = view
            .offset()
            .checked_add(view.length())
            .ok_or_else(out_of_range)?;
        if view_end > self.bin.len() {
            return Err(out_of_range());
        }

        let count = accessor.count();
        if count > 0 {
            let end = (count - 1)
                .checked_mul(stride)
                .and_then(|n| n.checked_add(VEC3_BYTES))
                .and_then(|n| n.checked_add(accessor.offset()))
                .ok_or_else(out_of_range)?;
            if end > view.length() {
                return Err(out_of_range());
            }
        }

        let offset = view
            .offset()
            .checked_add(accessor.offset())
            .ok_or_else(out_of_range)?;

        Ok(Vec3Layout {
            offset,
            stride,
            count,
        })
    }

    fn store_positions(
        &mut self,
        accessor: usize,
        layout: Vec3Layout,
        positions: &[[f32; 3]],
    ) -> Result<(), GlbError> {
        if positions.len() != layout.count {
            return Err(GlbError::InvalidReference(format!(
                "accessor {} holds {} vertices, got {}",
                accessor,
                layout.count,
                positions.len()
            )));
        }

        let mut min = [f32::INFINITY; 3];
        let mut max = [f32::NEG_INFINITY; 3];
        for (i, p) in positions.iter().enumerate() {
            // Bounded by the checked layout
            let base = layout.offset + i * layout.stride;
            let slot = self
                .bin
                .get_mut(base..base + VEC3_BYTES)
                .ok_or_else(|| GlbError::Truncated(format!("accessor {} vertex {}", accessor, i)))?;
            for (axis, value) in p.iter().enumerate() {
                slot[axis * 4..axis * 4 + 4].copy_from_slice(&value.to_le_bytes());
                min[axis] = min[axis].min(*value);
                max[axis] = max[axis].max(*value);
            }
        }

        if let Some(acc) = self
            .json
            .get_mut("accessors")
            .and_then(Value::as_array_mut)
            .and_then(|a| a.get_mut(accessor))
            .and_then(Value::as_object_mut)
        {
            if !positions.is_empty() {
                acc.insert("min".to_string(), json!(min));
                acc.insert("max".to_string(), json!(max));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct Vec3Layout {
    offset: usize,
    stride: usize,
    count: usize,
}

fn accessor_at(typed: &gltf::Document, index: usize) -> Result<Accessor<'_>, GlbError> {
    typed
        .accessors()
        .nth(index)
        .ok_or_else(|| GlbError::InvalidReference(format!("accessor {}", index)))
}

fn padded(len: usize) -> usize {
    len.div_ceil(4) * 4
}

fn vec3_from_value(value: Option<&Value>) -> Option<DVec3> {
    let values = value?.as_array()?;
    if values.len() != 3 {
        return None;
    }
    Some(DVec3::new(
        values[0].as_f64()?,
        values[1].as_f64()?,
        values[2].as_f64()?,
    ))
}

/// Reads a column-major glTF `matrix`.
fn matrix_from_value(value: Option<&Value>) -> Option<DMat4> {
    let values = value?.as_array()?;
    if values.len() != 16 {
        return None;
    }
    let mut m = [0.0; 16];
    for (slot, v) in m.iter_mut().zip(values) {
        *slot = v.as_f64()?;
    }
    Some(DMat4::from_cols_array(&m))
}

/// Splits an affine matrix into scale, rotation and translation. Singular or
/// non-finite matrices have no rotation.
fn decompose(matrix: &DMat4) -> Option<(DVec3, DQuat, DVec3)> {
    let det = matrix.determinant();
    if det == 0.0 || !det.is_finite() {
        return None;
    }
    let (scale, rotation, translation) = matrix.to_scale_rotation_translation();
    (scale.is_finite() && rotation.is_finite()).then_some((scale, rotation, translation))
}
