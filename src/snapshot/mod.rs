//! Snapshot encoding/decoding (spec §4.3): packs the post-initialization VM
//! state into a compact, CRC-protected, relocatable byte image, and reverses
//! that for tooling.
//!
//! [`SnapshotInfo`] is the boundary type: the reference host VM
//! ([`crate::hostvm::Executor::create_snapshot_info`]) builds one after
//! running `#entry`, and [`encoder::encode`] is the only thing that
//! consumes it (spec §6 "`vm.createSnapshotInfo() -> SnapshotInfo`").

mod crc;
mod decoder;
mod encoder;
mod layout;

pub use decoder::{decode, Component, ComponentKind, DecodedImage, DecodedRegion};
pub use encoder::encode;

use indexmap::IndexMap;

use crate::heap::Heap;
use crate::intern::{Interns, StringId};
use crate::value::Value;

/// One resolved import: which specifier to load and which slot to land it
/// in (spec §3 IL Unit `moduleImports`; §4.3 "import ... table").
#[derive(Debug, Clone)]
pub struct ImportEntry {
    pub specifier: StringId,
}

/// One resolved export: a stable numeric id to the value the host VM
/// exposed via `vmExport`/`vm.resolveExport` (spec §6).
#[derive(Debug, Clone)]
pub struct ExportEntry {
    pub export_id: u16,
    pub value: Value,
}

/// The live VM state the snapshot encoder serializes (spec §2 step 4-5,
/// §4.3 "Given the VM's live graph").
///
/// Built once per `evaluateModule` + `createSnapshotInfo` round, then
/// handed to [`encoder::encode`] and discarded (spec §3 "Lifecycle").
pub struct SnapshotInfo {
    pub required_engine_version: u16,
    pub required_feature_flags: u32,
    /// Global values in declaration order, keyed by name (spec §4.3 step 2:
    /// "Emit globals into the initial-data region in declaration order").
    pub globals: IndexMap<StringId, Value>,
    pub heap: Heap,
    pub imports: Vec<ImportEntry>,
    pub exports: Vec<ExportEntry>,
    /// One entry per compiled IL function; a `Value::Function(id)` is valid
    /// iff `id.index() < function_count`.
    pub function_count: u32,
    pub interns: Interns,
}
