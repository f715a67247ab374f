//! End-to-end comparator tests over synthetic DTBs

use fdt_cmp::{compare, compare_mem_rsv, compare_structure, CompareError, Fdt, TokenKind};

const FDT_BEGIN_NODE: u32 = 0x1;
const FDT_END_NODE: u32 = 0x2;
const FDT_PROP: u32 = 0x3;
const FDT_NOP: u32 = 0x4;
const FDT_END: u32 = 0x9;

const FDT_MAGIC: u32 = 0xd00d_feed;
const HEADER_SIZE: usize = 40;

/// Assembles a version-17 DTB from reservation records and structure
/// tokens, deduplicating property names into the strings block the way
/// dtc does.
#[derive(Default)]
struct TreeBuilder {
    reservations: Vec<(u64, u64)>,
    structure: Vec<u8>,
    strings: Vec<u8>,
}

impl TreeBuilder {
    fn new() -> Self {
        Self::default()
    }

    fn reserve(mut self, address: u64, size: u64) -> Self {
        self.reservations.push((address, size));
        self
    }

    fn push_u32(&mut self, value: u32) {
        self.structure.extend_from_slice(&value.to_be_bytes());
    }

    fn pad_structure(&mut self) {
        while self.structure.len() % 4 != 0 {
            self.structure.push(0);
        }
    }

    fn begin_node(mut self, name: &str) -> Self {
        self.push_u32(FDT_BEGIN_NODE);
        self.structure.extend_from_slice(name.as_bytes());
        self.structure.push(0);
        self.pad_structure();
        self
    }

    fn end_node(mut self) -> Self {
        self.push_u32(FDT_END_NODE);
        self
    }

    fn nop(mut self) -> Self {
        self.push_u32(FDT_NOP);
        self
    }

    fn prop(mut self, name: &str, value: &[u8]) -> Self {
        let name_offset = self.string_offset(name);
        self.push_u32(FDT_PROP);
        self.push_u32(value.len() as u32);
        self.push_u32(name_offset);
        self.structure.extend_from_slice(value);
        self.pad_structure();
        self
    }

    fn string_offset(&mut self, name: &str) -> u32 {
        let mut offset = 0;
        while offset < self.strings.len() {
            let end = offset
                + self.strings[offset..]
                    .iter()
                    .position(|&b| b == 0)
                    .unwrap();
            if self.strings[offset..end] == *name.as_bytes() {
                return offset as u32;
            }
            offset = end + 1;
        }
        let offset = self.strings.len() as u32;
        self.strings.extend_from_slice(name.as_bytes());
        self.strings.push(0);
        offset
    }

    fn build(mut self) -> Vec<u8> {
        self.push_u32(FDT_END);

        let rsv_size = (self.reservations.len() + 1) * 16;
        let off_rsv = HEADER_SIZE;
        let off_struct = off_rsv + rsv_size;
        let off_strings = off_struct + self.structure.len();
        let total = off_strings + self.strings.len();

        let mut blob = Vec::with_capacity(total);
        for field in [
            FDT_MAGIC,
            total as u32,
            off_struct as u32,
            off_strings as u32,
            off_rsv as u32,
            17, // version
            16, // last_comp_version
            0,  // boot_cpuid_phys
            self.strings.len() as u32,
            self.structure.len() as u32,
        ] {
            blob.extend_from_slice(&field.to_be_bytes());
        }
        for (address, size) in &self.reservations {
            blob.extend_from_slice(&address.to_be_bytes());
            blob.extend_from_slice(&size.to_be_bytes());
        }
        blob.extend_from_slice(&[0; 16]);
        blob.extend_from_slice(&self.structure);
        blob.extend_from_slice(&self.strings);
        blob
    }
}

fn sample_tree() -> TreeBuilder {
    TreeBuilder::new()
        .reserve(0x4000_0000, 0x1000)
        .reserve(0x8000_0000, 0x2000)
        .begin_node("")
        .prop("compatible", b"test,board-v1\0")
        .prop("#address-cells", &1u32.to_be_bytes())
        .begin_node("memory@80000000")
        .prop("reg", &[0x80, 0, 0, 0, 0, 0, 0x10, 0])
        .end_node()
        .begin_node("chosen")
        .prop("bootargs", b"console=ttyS0\0")
        .end_node()
        .end_node()
}

#[test]
fn tree_equals_itself() {
    let blob = sample_tree().build();
    let fdt = Fdt::from_bytes(&blob).unwrap();
    assert!(compare(&fdt, &fdt).is_ok());
}

#[test]
fn independently_built_identical_trees_are_equal() {
    let blob1 = sample_tree().build();
    let blob2 = sample_tree().build();
    let fdt1 = Fdt::from_bytes(&blob1).unwrap();
    let fdt2 = Fdt::from_bytes(&blob2).unwrap();
    assert!(compare(&fdt1, &fdt2).is_ok());
}

#[test]
fn reserve_order_is_significant() {
    let blob1 = sample_tree().build();
    let blob2 = TreeBuilder::new()
        .reserve(0x8000_0000, 0x2000)
        .reserve(0x4000_0000, 0x1000)
        .begin_node("")
        .end_node()
        .build();
    let fdt1 = Fdt::from_bytes(&blob1).unwrap();
    let fdt2 = Fdt::from_bytes(&blob2).unwrap();

    let err = compare_mem_rsv(&fdt1, &fdt2).unwrap_err();
    assert!(matches!(err, CompareError::ReserveEntry { index: 0, .. }));
    // Diagnostics report both pairs in hex
    assert!(format!("{err}").contains("0x4000"));
}

#[test]
fn extra_reserve_entry_fails_on_count() {
    let blob1 = sample_tree().build();
    let blob2 = sample_tree().reserve(0xc000_0000, 0x3000).build();
    let fdt1 = Fdt::from_bytes(&blob1).unwrap();
    let fdt2 = Fdt::from_bytes(&blob2).unwrap();

    assert!(matches!(
        compare(&fdt1, &fdt2),
        Err(CompareError::ReserveCount {
            first: 2,
            second: 3
        })
    ));
}

#[test]
fn padding_tokens_are_transparent() {
    let blob1 = sample_tree().build();
    let blob2 = TreeBuilder::new()
        .reserve(0x4000_0000, 0x1000)
        .reserve(0x8000_0000, 0x2000)
        .nop()
        .begin_node("")
        .nop()
        .nop()
        .prop("compatible", b"test,board-v1\0")
        .prop("#address-cells", &1u32.to_be_bytes())
        .begin_node("memory@80000000")
        .prop("reg", &[0x80, 0, 0, 0, 0, 0, 0x10, 0])
        .nop()
        .end_node()
        .begin_node("chosen")
        .prop("bootargs", b"console=ttyS0\0")
        .end_node()
        .end_node()
        .nop()
        .build();
    let fdt1 = Fdt::from_bytes(&blob1).unwrap();
    let fdt2 = Fdt::from_bytes(&blob2).unwrap();

    assert!(compare(&fdt1, &fdt2).is_ok());
}

#[test]
fn node_name_mismatch_is_reported() {
    let blob1 = TreeBuilder::new().begin_node("").begin_node("uart@10000000").end_node().end_node().build();
    let blob2 = TreeBuilder::new().begin_node("").begin_node("uart@10001000").end_node().end_node().build();
    let fdt1 = Fdt::from_bytes(&blob1).unwrap();
    let fdt2 = Fdt::from_bytes(&blob2).unwrap();

    assert!(matches!(
        compare_structure(&fdt1, &fdt2),
        Err(CompareError::NodeName { .. })
    ));
}

#[test]
fn sibling_property_order_is_significant() {
    let blob1 = TreeBuilder::new()
        .begin_node("")
        .prop("clock-frequency", &[0x00, 0x98, 0x96, 0x80])
        .prop("status", b"okay\0")
        .end_node()
        .build();
    let blob2 = TreeBuilder::new()
        .begin_node("")
        .prop("status", b"okay\0")
        .prop("clock-frequency", &[0x00, 0x98, 0x96, 0x80])
        .end_node()
        .build();
    let fdt1 = Fdt::from_bytes(&blob1).unwrap();
    let fdt2 = Fdt::from_bytes(&blob2).unwrap();

    // Same multiset of properties, but the first position already
    // disagrees on the name
    assert!(matches!(
        compare_structure(&fdt1, &fdt2),
        Err(CompareError::PropName { .. })
    ));
}

#[test]
fn length_mismatch_wins_over_value_comparison() {
    let blob1 = TreeBuilder::new()
        .begin_node("")
        .prop("serial", &[1, 2, 3])
        .end_node()
        .build();
    let blob2 = TreeBuilder::new()
        .begin_node("")
        .prop("serial", &[1, 2, 3, 4])
        .end_node()
        .build();
    let fdt1 = Fdt::from_bytes(&blob1).unwrap();
    let fdt2 = Fdt::from_bytes(&blob2).unwrap();

    // The shared prefix must not demote this to a value mismatch
    assert!(matches!(
        compare_structure(&fdt1, &fdt2),
        Err(CompareError::PropLen {
            first: 3,
            second: 4,
            ..
        })
    ));
}

#[test]
fn value_mismatch_is_byte_exact() {
    let blob1 = TreeBuilder::new()
        .begin_node("")
        .prop("mac-address", &[0x52, 0x54, 0x00, 0x12, 0x34, 0x56])
        .end_node()
        .build();
    let blob2 = TreeBuilder::new()
        .begin_node("")
        .prop("mac-address", &[0x52, 0x54, 0x00, 0x12, 0x34, 0x57])
        .end_node()
        .build();
    let fdt1 = Fdt::from_bytes(&blob1).unwrap();
    let fdt2 = Fdt::from_bytes(&blob2).unwrap();

    assert!(matches!(
        compare_structure(&fdt1, &fdt2),
        Err(CompareError::PropValue { .. })
    ));
}

#[test]
fn trailing_extra_node_fails_on_tag() {
    let blob1 = TreeBuilder::new().begin_node("").end_node().build();
    let blob2 = TreeBuilder::new()
        .begin_node("")
        .end_node()
        .begin_node("late")
        .end_node()
        .build();
    let fdt1 = Fdt::from_bytes(&blob1).unwrap();
    let fdt2 = Fdt::from_bytes(&blob2).unwrap();

    // fdt1 reaches FDT_END while fdt2 still has a node to offer
    assert!(matches!(
        compare_structure(&fdt1, &fdt2),
        Err(CompareError::Tag {
            first: TokenKind::End,
            second: TokenKind::BeginNode,
            ..
        })
    ));
}

#[test]
fn node_versus_property_fails_on_tag() {
    let blob1 = TreeBuilder::new()
        .begin_node("")
        .begin_node("leds")
        .end_node()
        .end_node()
        .build();
    let blob2 = TreeBuilder::new()
        .begin_node("")
        .prop("leds", &[])
        .end_node()
        .build();
    let fdt1 = Fdt::from_bytes(&blob1).unwrap();
    let fdt2 = Fdt::from_bytes(&blob2).unwrap();

    assert!(matches!(
        compare_structure(&fdt1, &fdt2),
        Err(CompareError::Tag {
            first: TokenKind::BeginNode,
            second: TokenKind::Prop,
            ..
        })
    ));
}

#[test]
fn reservation_check_runs_before_structure_check() {
    // Both tables and structures differ; the reservation diagnosis wins
    let blob1 = TreeBuilder::new()
        .reserve(0x1000, 0x100)
        .begin_node("")
        .end_node()
        .build();
    let blob2 = TreeBuilder::new()
        .begin_node("")
        .begin_node("extra")
        .end_node()
        .end_node()
        .build();
    let fdt1 = Fdt::from_bytes(&blob1).unwrap();
    let fdt2 = Fdt::from_bytes(&blob2).unwrap();

    assert!(matches!(
        compare(&fdt1, &fdt2),
        Err(CompareError::ReserveCount {
            first: 1,
            second: 0
        })
    ));
}
