use core::ffi::CStr;
use core::fmt;
use thiserror::Error;

use crate::fdt::{Fdt, FdtError, MemReserve};
use crate::token::{Token, TokenIter, TokenKind};

/// Which of the two trees a diagnostic refers to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tree {
    First,
    Second,
}

impl fmt::Display for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::First => "fdt1",
            Self::Second => "fdt2",
        })
    }
}

/// The first point of divergence between two trees
///
/// Structure offsets are relative to each blob's structure block, one
/// per tree, printed as `(offset1, offset2)`. Borrowed names point into
/// the blobs being compared.
#[derive(Clone, Copy, Debug, Error)]
pub enum CompareError<'a> {
    #[error("Trees have different number of reserve entries ({first} != {second})")]
    ReserveCount { first: usize, second: usize },
    #[error("Could not read reserve entry {index} of {tree}: {source}")]
    ReserveRead {
        tree: Tree,
        index: usize,
        source: FdtError,
    },
    #[error("Mismatch in reserve entry {index}: {first} != {second}")]
    ReserveEntry {
        index: usize,
        first: MemReserve,
        second: MemReserve,
    },
    #[error("Tag mismatch ({first} != {second}) at ({offset1}, {offset2})")]
    Tag {
        first: TokenKind,
        second: TokenKind,
        offset1: usize,
        offset2: usize,
    },
    #[error("Bad token in {tree} at offset {offset}: {source}")]
    Token {
        tree: Tree,
        offset: usize,
        source: FdtError,
    },
    #[error("Could not resolve property name in {tree} at offset {offset}: {source}")]
    StringLookup {
        tree: Tree,
        offset: usize,
        source: FdtError,
    },
    #[error("Name mismatch ({first:?} != {second:?}) at ({offset1}, {offset2})")]
    NodeName {
        first: &'a CStr,
        second: &'a CStr,
        offset1: usize,
        offset2: usize,
    },
    #[error("Property name mismatch ({first:?} != {second:?}) at ({offset1}, {offset2})")]
    PropName {
        first: &'a CStr,
        second: &'a CStr,
        offset1: usize,
        offset2: usize,
    },
    #[error("Property length mismatch ({first} != {second}) at ({offset1}, {offset2})")]
    PropLen {
        first: usize,
        second: usize,
        offset1: usize,
        offset2: usize,
    },
    #[error("Property value mismatch at ({offset1}, {offset2})")]
    PropValue { offset1: usize, offset2: usize },
}

/// Advance one blob's cursor past padding to its next significant token
fn next_significant<'a>(
    tree: Tree,
    walk: &mut TokenIter<'a>,
) -> Result<(usize, Token<'a>), CompareError<'a>> {
    loop {
        let offset = walk.offset();
        let token = walk
            .next_token()
            .map_err(|source| CompareError::Token {
                tree,
                offset,
                source,
            })?;
        if !matches!(token, Token::Nop) {
            return Ok((offset, token));
        }
    }
}

/// Compare the memory reservation tables of two trees
///
/// Record order is significant: tables holding the same entries in a
/// different order compare unequal.
pub fn compare_mem_rsv<'a>(fdt1: &Fdt<'a>, fdt2: &Fdt<'a>) -> Result<(), CompareError<'a>> {
    let (count1, count2) = (fdt1.reserve_count(), fdt2.reserve_count());
    if count1 != count2 {
        return Err(CompareError::ReserveCount {
            first: count1,
            second: count2,
        });
    }

    for index in 0..count1 {
        let first = fdt1
            .reserve_at(index)
            .map_err(|source| CompareError::ReserveRead {
                tree: Tree::First,
                index,
                source,
            })?;
        let second = fdt2
            .reserve_at(index)
            .map_err(|source| CompareError::ReserveRead {
                tree: Tree::Second,
                index,
                source,
            })?;
        if first != second {
            return Err(CompareError::ReserveEntry {
                index,
                first,
                second,
            });
        }
    }

    Ok(())
}

/// Walk both structure blocks in lockstep and check that they describe
/// the same tree
///
/// Each blob advances through its own padding independently, then the
/// two significant tokens must agree on tag, on node name, and for
/// properties on name, declared length and value bytes. Length is
/// checked strictly before the value, so a property that is a byte
/// prefix of its counterpart reports a length mismatch, never a value
/// mismatch. The only successful exit is both walks reaching `FDT_END`
/// together.
pub fn compare_structure<'a>(fdt1: &Fdt<'a>, fdt2: &Fdt<'a>) -> Result<(), CompareError<'a>> {
    let mut walk1 = fdt1.tokens();
    let mut walk2 = fdt2.tokens();

    loop {
        let (offset1, token1) = next_significant(Tree::First, &mut walk1)?;
        let (offset2, token2) = next_significant(Tree::Second, &mut walk2)?;

        if token1.kind() != token2.kind() {
            return Err(CompareError::Tag {
                first: token1.kind(),
                second: token2.kind(),
                offset1,
                offset2,
            });
        }

        match (token1, token2) {
            (Token::BeginNode { name: first }, Token::BeginNode { name: second }) => {
                if first != second {
                    return Err(CompareError::NodeName {
                        first,
                        second,
                        offset1,
                        offset2,
                    });
                }
            }
            (
                Token::Prop {
                    name_offset: nameoff1,
                    value: value1,
                },
                Token::Prop {
                    name_offset: nameoff2,
                    value: value2,
                },
            ) => {
                let first = fdt1
                    .strings_at(nameoff1)
                    .map_err(|source| CompareError::StringLookup {
                        tree: Tree::First,
                        offset: offset1,
                        source,
                    })?;
                let second = fdt2
                    .strings_at(nameoff2)
                    .map_err(|source| CompareError::StringLookup {
                        tree: Tree::Second,
                        offset: offset2,
                        source,
                    })?;
                if first != second {
                    return Err(CompareError::PropName {
                        first,
                        second,
                        offset1,
                        offset2,
                    });
                }
                if value1.len() != value2.len() {
                    return Err(CompareError::PropLen {
                        first: value1.len(),
                        second: value2.len(),
                        offset1,
                        offset2,
                    });
                }
                if value1 != value2 {
                    return Err(CompareError::PropValue { offset1, offset2 });
                }
            }
            (Token::End, Token::End) => return Ok(()),
            // EndNode carries nothing beyond its tag
            _ => {}
        }
    }
}

/// Check two trees for ordered structural equality
///
/// Runs [`compare_mem_rsv`] then [`compare_structure`]; the first
/// divergence either finds is the verdict.
pub fn compare<'a>(fdt1: &Fdt<'a>, fdt2: &Fdt<'a>) -> Result<(), CompareError<'a>> {
    compare_mem_rsv(fdt1, fdt2)?;
    compare_structure(fdt1, fdt2)
}
