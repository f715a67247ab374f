use core::ffi::CStr;
use core::fmt;
use core::ops::Range;
use thiserror::Error;
use zerocopy::{BigEndian, FromBytes, U32, U64};

use crate::token::{Token, TokenIter};

const FDT_MAGIC: u32 = 0xd00d_feed;

/// The size of one memory reservation record: a (u64, u64) pair
const RESERVE_ENTRY_SIZE: usize = 16;

#[derive(Clone, Copy, FromBytes)]
#[allow(unused)]
#[repr(C)]
struct Header {
    magic: U32<BigEndian>,
    totalsize: U32<BigEndian>,
    off_dt_struct: U32<BigEndian>,
    off_dt_strings: U32<BigEndian>,
    off_mem_rsvmap: U32<BigEndian>,
    version: U32<BigEndian>,
    last_comp_version: U32<BigEndian>,
    boot_cpuid_phys: U32<BigEndian>,
    size_dt_strings: U32<BigEndian>,
    size_dt_struct: U32<BigEndian>,
}

#[derive(Clone, Copy, FromBytes)]
#[repr(C)]
struct ReserveRaw {
    address: U64<BigEndian>,
    size: U64<BigEndian>,
}

/// One record of the memory reservation table
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemReserve {
    pub address: u64,
    pub size: u64,
}

impl MemReserve {
    fn is_terminator(&self) -> bool {
        self.address == 0 && self.size == 0
    }
}

impl fmt::Display for MemReserve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:#x}, {:#x})", self.address, self.size)
    }
}

impl From<ReserveRaw> for MemReserve {
    fn from(raw: ReserveRaw) -> Self {
        Self {
            address: raw.address.get(),
            size: raw.size.get(),
        }
    }
}

/// A flattened devicetree validation or access error
///
/// Offsets in token errors are relative to the structure block start.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum FdtError {
    #[error("Not enough bytes for FDT header")]
    TruncatedHeader,
    #[error("Invalid FDT magic")]
    BadMagic,
    #[error("FDT totalsize more than available data")]
    BadTotalSize,
    #[error("Bad structure block, range out of bounds")]
    BadStructBlock,
    #[error("Bad strings block, range out of bounds")]
    BadStringsBlock,
    #[error("Bad memory reservation block, range out of bounds")]
    BadReserveBlock,
    #[error("Memory reservation block is missing its terminating entry")]
    UnterminatedReserveMap,
    #[error("Bad FDT token at offset {0}")]
    BadToken(usize),
    #[error("Unexpected FDT_END_NODE at offset {0}, no matching FDT_BEGIN_NODE")]
    UnbalancedEndNode(usize),
    #[error("Unexpected FDT_END at offset {0}, missing FDT_END_NODE")]
    UnclosedNode(usize),
    #[error("Property name offset {0} is out of range or not NUL-terminated")]
    BadNameOffset(usize),
    #[error("Reserve entry {0} is out of range")]
    BadReserveIndex(usize),
}

fn make_range(start: usize, len: usize) -> Option<Range<usize>> {
    start.checked_add(len).map(|end| start..end)
}

fn trim_strings_range(bytes: &[u8], mut range: Range<usize>) -> Range<usize> {
    while bytes[range.clone()].last().map_or(false, |&x| x != 0) {
        range.end -= 1;
    }

    range
}

fn check<E>(check: bool, err: E) -> Result<(), E> {
    check.then_some(()).ok_or(err)
}

/// A validated, read-only view of a flattened devicetree blob
///
/// See [crate level documentation][crate] for an introduction. The view
/// borrows the blob and never copies or mutates it; everything handed
/// out (names, property values, reservation records) is decoded on
/// demand.
pub struct Fdt<'a> {
    raw: &'a [u8],
    struct_range: Range<usize>,
    strings_range: Range<usize>,
    reserve_start: usize,
}

impl<'a> Fdt<'a> {
    /// Create and validate a flattened devicetree from `bytes`
    ///
    /// Validation covers the header (magic, totalsize, block ranges)
    /// and one well-formedness pass over the structure block: every
    /// token must decode, node begin/end tokens must balance, property
    /// name offsets must resolve, and the reservation table must carry
    /// its (0, 0) terminator. The comparators rely on this so their
    /// own walks only fail on genuine divergence.
    pub fn from_bytes(bytes: &'a [u8]) -> Result<Self, FdtError> {
        let header = Header::read_from_prefix(bytes).ok_or(FdtError::TruncatedHeader)?;

        // If magic is wrong stop here and don't continue
        check(header.magic.get() == FDT_MAGIC, FdtError::BadMagic)?;

        let total_size = header.totalsize.get() as usize;
        check(total_size <= bytes.len(), FdtError::BadTotalSize)?;

        let struct_range = make_range(
            header.off_dt_struct.get() as usize,
            header.size_dt_struct.get() as usize,
        )
        .ok_or(FdtError::BadStructBlock)?;
        check(struct_range.end <= bytes.len(), FdtError::BadStructBlock)?;

        let strings_range = make_range(
            header.off_dt_strings.get() as usize,
            header.size_dt_strings.get() as usize,
        )
        .ok_or(FdtError::BadStringsBlock)?;
        check(strings_range.end <= bytes.len(), FdtError::BadStringsBlock)?;

        // A strings block not ending in NUL would let a name run past
        // the block; trim the unterminated tail instead
        let strings_range = trim_strings_range(bytes, strings_range);

        let reserve_start = header.off_mem_rsvmap.get() as usize;
        check(reserve_start <= bytes.len(), FdtError::BadReserveBlock)?;

        let res = Fdt {
            raw: bytes,
            struct_range,
            strings_range,
            reserve_start,
        };

        res.validate()?;
        Ok(res)
    }

    fn validate(&self) -> Result<(), FdtError> {
        let mut walk = self.tokens();
        let mut depth: usize = 0;

        loop {
            let offset = walk.offset();
            match walk.next_token()? {
                Token::BeginNode { .. } => depth += 1,
                Token::EndNode => {
                    depth = depth
                        .checked_sub(1)
                        .ok_or(FdtError::UnbalancedEndNode(offset))?;
                }
                Token::Prop { name_offset, .. } => {
                    self.strings_at(name_offset)?;
                }
                Token::Nop => {}
                Token::End => {
                    check(depth == 0, FdtError::UnclosedNode(offset))?;
                    break;
                }
            }
        }

        let has_terminator = self.raw[self.reserve_start..]
            .chunks_exact(RESERVE_ENTRY_SIZE)
            .any(|chunk| chunk.iter().all(|&b| b == 0));
        check(has_terminator, FdtError::UnterminatedReserveMap)?;

        Ok(())
    }

    fn struct_block(&self) -> &'a [u8] {
        &self.raw[self.struct_range.clone()]
    }

    fn strings_block(&self) -> &'a [u8] {
        &self.raw[self.strings_range.clone()]
    }

    /// A fresh token cursor at the start of the structure block
    pub fn tokens(&self) -> TokenIter<'a> {
        TokenIter::new(self.struct_block())
    }

    /// Resolve a property name by its offset into the strings block
    pub fn strings_at(&self, name_offset: usize) -> Result<&'a CStr, FdtError> {
        let tail = self
            .strings_block()
            .get(name_offset..)
            .ok_or(FdtError::BadNameOffset(name_offset))?;
        let end = tail
            .iter()
            .position(|&x| x == 0)
            .ok_or(FdtError::BadNameOffset(name_offset))?;
        Ok(CStr::from_bytes_with_nul(&tail[..=end]).unwrap())
    }

    fn reserve_entries(&self) -> impl Iterator<Item = MemReserve> + 'a {
        self.raw[self.reserve_start..]
            .chunks_exact(RESERVE_ENTRY_SIZE)
            .map_while(ReserveRaw::read_from)
            .map(MemReserve::from)
            .take_while(|entry| !entry.is_terminator())
    }

    /// Number of reservation records before the terminating entry
    pub fn reserve_count(&self) -> usize {
        self.reserve_entries().count()
    }

    /// Fetch one reservation record by index
    pub fn reserve_at(&self, index: usize) -> Result<MemReserve, FdtError> {
        self.reserve_entries()
            .nth(index)
            .ok_or(FdtError::BadReserveIndex(index))
    }
}
