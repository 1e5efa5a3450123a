//! Snapshot encoding (spec §4.3 "Encoding algorithm").
//!
//! Two passes over the live graph: a discovery pass that only needs to
//! *count* how many non-inline numbers the graph contains (to size the
//! `initialHeap` region before any offsets are fixed), then a single
//! encoding pass that assigns every allocation, function, string and boxed
//! number a logical address and writes every region's bytes in order.

use ahash::{AHashMap, AHashSet};

use crate::error::SnapshotResult;
use crate::heap::{Allocation, AllocationId, Heap};
use crate::intern::StringId;
use crate::snapshot::layout::{self, Region, SectionTag};
use crate::snapshot::SnapshotInfo;
use crate::value::{FunctionId, Value};

/// True iff `n` fits the inline integer range and has no fractional part
/// (spec §3 "integers in -0x2000..+0x1FFF inline directly").
fn is_inline_number(n: f64) -> bool {
    n.fract() == 0.0 && (layout::INLINE_INT_MIN as f64..=layout::INLINE_INT_MAX as f64).contains(&n)
}

fn count_boxed_numbers_in(values: impl Iterator<Item = Value>, count: &mut usize) {
    for value in values {
        if let Value::Number(n) = value {
            if !is_inline_number(n) {
                *count += 1;
            }
        }
    }
}

fn allocation_values(alloc: &Allocation) -> Vec<Value> {
    match alloc {
        Allocation::Object(props) => props.values().cloned().collect(),
        Allocation::Array(items) => items.clone(),
        Allocation::Closure { scope, .. } => scope.clone(),
        Allocation::String(_) | Allocation::Function(_) => Vec::new(),
    }
}

fn regular_allocation_size(alloc: &Allocation) -> u16 {
    let length_prefix = if matches!(alloc, Allocation::Array(_)) { 2 } else { 0 };
    2 + length_prefix + alloc.payload_size() as u16
}

struct RegionOffsets {
    initial_data: u16,
    initial_heap: u16,
    gc_roots: u16,
    import_table: u16,
    export_table: u16,
    short_call_table: u16,
    string_table: u16,
    total: u16,
}

struct Encoder {
    regions: RegionOffsets,
    alloc_offset: AHashMap<AllocationId, u16>,
    string_offset: AHashMap<StringId, u16>,
    /// Non-inline numbers discovered so far, relative to `initialHeap`'s
    /// start; grows past the end of the regular allocations.
    boxed_numbers: Vec<f64>,
    regular_heap_size: u16,
}

impl Encoder {
    fn logical_of_allocation(&self, id: AllocationId) -> u16 {
        let offset = *self
            .alloc_offset
            .get(&id)
            .expect("every live allocation was assigned an offset up front");
        layout::make_logical(SectionTag::GcP, offset)
    }

    fn logical_of_function(&self, id: FunctionId) -> u16 {
        let offset = self.regions.short_call_table + (id.index() as u16) * 2;
        layout::make_logical(SectionTag::PgmP, offset)
    }

    fn logical_of_string(&self, id: StringId) -> u16 {
        let offset = *self
            .string_offset
            .get(&id)
            .expect("every interned string was assigned an offset up front");
        layout::make_logical(SectionTag::PgmP, offset)
    }

    /// Encodes one value to its 16-bit logical address/inline form,
    /// boxing a non-inline number into `initialHeap` the first time it's
    /// seen (spec §3 Value, §9 "Cyclic value graph").
    fn encode_value(&mut self, value: &Value) -> u16 {
        match value {
            Value::Undefined => layout::WELL_KNOWN_UNDEFINED,
            Value::Null => layout::WELL_KNOWN_NULL,
            Value::Boolean(false) => layout::WELL_KNOWN_FALSE,
            Value::Boolean(true) => layout::WELL_KNOWN_TRUE,
            Value::Number(n) if is_inline_number(*n) => layout::encode_inline_int(*n as i32),
            Value::Number(n) => {
                let offset = self.regular_heap_size + (self.boxed_numbers.len() as u16) * 10;
                self.boxed_numbers.push(*n);
                layout::make_logical(SectionTag::GcP, offset)
            }
            Value::String(id) => self.logical_of_string(*id),
            Value::Reference(id) => self.logical_of_allocation(*id),
            Value::Function(id) => self.logical_of_function(*id),
            Value::HostFunction(id) => layout::encode_inline_int(id.index() as i32),
            Value::Ephemeral(id) => layout::encode_inline_int(id.0 as i32),
        }
    }

    fn write_regular_allocations(&mut self, heap: &Heap, out: &mut Vec<u8>) {
        for id in heap.live_ids() {
            let alloc = heap.get(id);
            match alloc {
                Allocation::Object(props) => {
                    out.extend_from_slice(&layout::make_allocation_header(layout::TYPE_CODE_OBJECT, alloc.payload_size() as u16).to_le_bytes());
                    for (key, value) in props {
                        out.extend_from_slice(&self.logical_of_string(*key).to_le_bytes());
                        let encoded = self.encode_value(value);
                        out.extend_from_slice(&encoded.to_le_bytes());
                    }
                }
                Allocation::Array(items) => {
                    out.extend_from_slice(&(items.len() as u16).to_le_bytes());
                    out.extend_from_slice(&layout::make_allocation_header(layout::TYPE_CODE_ARRAY, alloc.payload_size() as u16).to_le_bytes());
                    for value in items {
                        let encoded = self.encode_value(value);
                        out.extend_from_slice(&encoded.to_le_bytes());
                    }
                }
                Allocation::String(s) => {
                    out.extend_from_slice(&layout::make_allocation_header(layout::TYPE_CODE_STRING, alloc.payload_size() as u16).to_le_bytes());
                    out.extend_from_slice(s.as_bytes());
                }
                Allocation::Function(function_id) => {
                    out.extend_from_slice(&layout::make_allocation_header(layout::TYPE_CODE_FUNCTION, alloc.payload_size() as u16).to_le_bytes());
                    out.extend_from_slice(&self.logical_of_function(*function_id).to_le_bytes());
                }
                Allocation::Closure { function, scope } => {
                    out.extend_from_slice(&layout::make_allocation_header(layout::TYPE_CODE_CLOSURE, alloc.payload_size() as u16).to_le_bytes());
                    out.extend_from_slice(&self.logical_of_function(*function).to_le_bytes());
                    for value in scope {
                        let encoded = self.encode_value(value);
                        out.extend_from_slice(&encoded.to_le_bytes());
                    }
                }
            }
        }
    }

    fn write_boxed_numbers(&self, out: &mut Vec<u8>) {
        for n in &self.boxed_numbers {
            out.extend_from_slice(&layout::make_allocation_header(layout::TYPE_CODE_NUMBER, 8).to_le_bytes());
            out.extend_from_slice(&n.to_le_bytes());
        }
    }
}

/// Encodes `info` into a snapshot image (spec §4.3 "Encoding algorithm").
pub fn encode(info: &SnapshotInfo) -> SnapshotResult<Vec<u8>> {
    // --- discovery pass: count boxed numbers to size initialHeap --------
    let mut boxed_count = 0usize;
    count_boxed_numbers_in(info.globals.values().cloned(), &mut boxed_count);
    count_boxed_numbers_in(info.exports.iter().map(|e| e.value.clone()), &mut boxed_count);
    let mut alloc_offset = AHashMap::new();
    let mut regular_heap_size: u16 = 0;
    for id in info.heap.live_ids() {
        alloc_offset.insert(id, regular_heap_size);
        let alloc = info.heap.get(id);
        count_boxed_numbers_in(allocation_values(alloc).into_iter(), &mut boxed_count);
        regular_heap_size += regular_allocation_size(alloc);
    }

    // --- fix region offsets ------------------------------------------------
    let initial_data = layout::HEADER_SIZE as u16;
    let initial_data_size = (info.globals.len() as u16) * 2;
    let initial_heap = initial_data + initial_data_size;
    let initial_heap_size = regular_heap_size + (boxed_count as u16) * 10;
    let gc_roots = initial_heap + initial_heap_size;

    let roots = gather_roots(info);
    let gc_roots_size = (roots.len() as u16) * 2;
    let import_table = gc_roots + gc_roots_size;
    let import_table_size = (info.imports.len() as u16) * 2;
    let export_table = import_table + import_table_size;
    let export_table_size = (info.exports.len() as u16) * 4;
    let short_call_table = export_table + export_table_size;
    let short_call_table_size = (info.function_count as u16) * 2;
    let string_table = short_call_table + short_call_table_size;

    let mut string_offset = AHashMap::new();
    let mut cursor = 0u16;
    for (id, s) in info.interns.iter() {
        string_offset.insert(id, cursor);
        cursor += 2 + s.len() as u16;
    }
    let string_table_size = cursor;
    let total = string_table + string_table_size;

    let mut encoder = Encoder {
        regions: RegionOffsets {
            initial_data,
            initial_heap,
            gc_roots,
            import_table,
            export_table,
            short_call_table,
            string_table,
            total,
        },
        alloc_offset,
        string_offset,
        boxed_numbers: Vec::new(),
        regular_heap_size,
    };

    // --- write regions -------------------------------------------------
    let mut globals_bytes = Vec::with_capacity(initial_data_size as usize);
    for value in info.globals.values() {
        let encoded = encoder.encode_value(value);
        globals_bytes.extend_from_slice(&encoded.to_le_bytes());
    }

    let mut heap_bytes = Vec::with_capacity(initial_heap_size as usize);
    encoder.write_regular_allocations(&info.heap, &mut heap_bytes);
    encoder.write_boxed_numbers(&mut heap_bytes);
    debug_assert_eq!(heap_bytes.len(), initial_heap_size as usize);

    let mut gc_roots_bytes = Vec::with_capacity(gc_roots_size as usize);
    for id in &roots {
        gc_roots_bytes.extend_from_slice(&encoder.logical_of_allocation(*id).to_le_bytes());
    }

    let mut import_bytes = Vec::with_capacity(import_table_size as usize);
    for import in &info.imports {
        let addr = encoder.logical_of_string(import.specifier);
        import_bytes.extend_from_slice(&addr.to_le_bytes());
    }

    let mut export_bytes = Vec::with_capacity(export_table_size as usize);
    for export in &info.exports {
        export_bytes.extend_from_slice(&export.export_id.to_le_bytes());
        let addr = encoder.encode_value(&export.value);
        export_bytes.extend_from_slice(&addr.to_le_bytes());
    }

    let mut short_call_bytes = Vec::with_capacity(short_call_table_size as usize);
    for id in 0..info.function_count {
        short_call_bytes.extend_from_slice(&(id as u16).to_le_bytes());
    }

    let mut string_bytes = Vec::with_capacity(string_table_size as usize);
    for (_, s) in info.interns.iter() {
        string_bytes.extend_from_slice(&(s.len() as u16).to_le_bytes());
        string_bytes.extend_from_slice(s.as_bytes());
    }

    // --- assemble image --------------------------------------------------
    let mut image = vec![0u8; encoder.regions.total as usize];
    image[layout::OFF_BYTECODE_VERSION] = layout::BYTECODE_VERSION;
    image[layout::OFF_HEADER_SIZE] = layout::HEADER_SIZE;
    image[layout::OFF_BYTECODE_SIZE..layout::OFF_BYTECODE_SIZE + 2].copy_from_slice(&encoder.regions.total.to_le_bytes());
    image[layout::OFF_ENGINE_VERSION..layout::OFF_ENGINE_VERSION + 2].copy_from_slice(&info.required_engine_version.to_le_bytes());
    image[layout::OFF_FEATURE_FLAGS..layout::OFF_FEATURE_FLAGS + 4].copy_from_slice(&info.required_feature_flags.to_le_bytes());
    image[layout::OFF_GLOBAL_COUNT..layout::OFF_GLOBAL_COUNT + 2].copy_from_slice(&(info.globals.len() as u16).to_le_bytes());

    write_region_entry(&mut image, Region::InitialData, initial_data, initial_data_size);
    write_region_entry(&mut image, Region::InitialHeap, initial_heap, initial_heap_size);
    write_region_entry(&mut image, Region::GcRoots, gc_roots, gc_roots_size);
    write_region_entry(&mut image, Region::ImportTable, import_table, import_table_size);
    write_region_entry(&mut image, Region::ExportTable, export_table, export_table_size);
    write_region_entry(&mut image, Region::ShortCallTable, short_call_table, short_call_table_size);
    write_region_entry(&mut image, Region::StringTable, string_table, string_table_size);

    let mut at = layout::HEADER_SIZE as usize;
    for bytes in [globals_bytes, heap_bytes, gc_roots_bytes, import_bytes, export_bytes, short_call_bytes, string_bytes] {
        image[at..at + bytes.len()].copy_from_slice(&bytes);
        at += bytes.len();
    }

    // --- back-patch CRC (step 5) -----------------------------------------
    let crc = crate::snapshot::crc::checksum(&image[layout::CRC_COVERAGE_START..]);
    image[layout::OFF_CRC..layout::OFF_CRC + 2].copy_from_slice(&crc.to_le_bytes());

    Ok(image)
}

fn write_region_entry(image: &mut [u8], region: Region, offset: u16, size: u16) {
    let at = region.table_entry_offset();
    image[at..at + 2].copy_from_slice(&offset.to_le_bytes());
    image[at + 2..at + 4].copy_from_slice(&size.to_le_bytes());
}

/// Every allocation directly referenced from a global or an export: the
/// entry points a real GC would start marking from (spec §4.3 step 1).
fn gather_roots(info: &SnapshotInfo) -> Vec<AllocationId> {
    let mut seen = AHashSet::new();
    let mut roots = Vec::new();
    let mut note = |value: &Value| {
        if let Value::Reference(id) = value {
            if seen.insert(*id) {
                roots.push(*id);
            }
        }
    };
    for value in info.globals.values() {
        note(value);
    }
    for export in &info.exports {
        note(&export.value);
    }
    roots.sort_by_key(|id| id.index());
    roots
}
