use core::ffi::CStr;
use core::fmt;
use nom::{bytes::complete::*, error::*, number::complete::*, sequence::*, *};

use crate::fdt::FdtError;

const FDT_BEGIN_NODE: u32 = 0x1;
const FDT_END_NODE: u32 = 0x2;
const FDT_PROP: u32 = 0x3;
const FDT_NOP: u32 = 0x4;
const FDT_END: u32 = 0x9;

/// One token of a structure block, decoded at a cursor position
///
/// Every token is surfaced, including [`Nop`][Token::Nop] padding and
/// the terminating [`End`][Token::End]; it is up to the caller to skip
/// what it considers insignificant.
#[derive(Clone, Copy, Debug)]
pub enum Token<'a> {
    /// `FDT_BEGIN_NODE` with the node's name, unit address included
    BeginNode { name: &'a CStr },
    /// `FDT_END_NODE`
    EndNode,
    /// `FDT_PROP` with the name offset into the strings block and the
    /// raw value bytes (exactly the declared length, padding excluded)
    Prop { name_offset: usize, value: &'a [u8] },
    /// `FDT_NOP` padding
    Nop,
    /// `FDT_END`, the end of the structure block
    End,
}

/// The tag discriminating a [`Token`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    BeginNode,
    EndNode,
    Prop,
    Nop,
    End,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::BeginNode => "FDT_BEGIN_NODE",
            Self::EndNode => "FDT_END_NODE",
            Self::Prop => "FDT_PROP",
            Self::Nop => "FDT_NOP",
            Self::End => "FDT_END",
        })
    }
}

fn read_c_string(input: &[u8]) -> Option<(&CStr, &[u8])> {
    let position = input.iter().position(|&x| x == 0)?;
    let (string, rest) = input.split_at(position + 1);
    Some((CStr::from_bytes_with_nul(string).unwrap(), rest))
}

fn padding_len(len: usize) -> usize {
    let rounded = (len + 3) / 4 * 4;
    rounded - len
}

fn c_string(input: &[u8]) -> IResult<&[u8], &CStr> {
    let (result, input) = read_c_string(input).ok_or(Err::Incomplete(Needed::Unknown))?;
    Ok((input, result))
}

impl<'a> Token<'a> {
    pub fn kind(&self) -> TokenKind {
        match self {
            Self::BeginNode { .. } => TokenKind::BeginNode,
            Self::EndNode => TokenKind::EndNode,
            Self::Prop { .. } => TokenKind::Prop,
            Self::Nop => TokenKind::Nop,
            Self::End => TokenKind::End,
        }
    }

    /// Parse exactly one token, consuming its trailing alignment padding
    pub(crate) fn parse(mut input: &'a [u8]) -> IResult<&'a [u8], Self> {
        let tag;
        (input, tag) = be_u32(input)?;
        let res = match tag {
            FDT_BEGIN_NODE => {
                let name;
                (input, name) = c_string(input)?;
                (input, _) = take(padding_len(name.to_bytes_with_nul().len()))(input)?;
                Self::BeginNode { name }
            }
            FDT_END_NODE => Self::EndNode,
            FDT_PROP => {
                let (len, name_offset);
                (input, (len, name_offset)) = tuple((be_u32, be_u32))(input)?;
                let len = len as usize;
                let value;
                (input, value) = take(len)(input)?;
                (input, _) = take(padding_len(len))(input)?;

                Self::Prop {
                    name_offset: name_offset as usize,
                    value,
                }
            }
            FDT_NOP => Self::Nop,
            FDT_END => Self::End,
            _ => {
                return Err(Err::Error(Error {
                    input,
                    code: ErrorKind::Tag,
                }))
            }
        };
        Ok((input, res))
    }
}

/// A decoding cursor over one blob's structure block
///
/// Created by [`Fdt::tokens`][crate::Fdt::tokens], starting at the
/// beginning of the block. Each [`next_token`][TokenIter::next_token]
/// strictly advances the cursor; a malformed stream is reported through
/// the result rather than by panicking, so a caller can attribute the
/// failure to the offending blob. The walk is one-pass: rewinding means
/// asking the [`Fdt`][crate::Fdt] for a fresh cursor.
#[derive(Clone)]
pub struct TokenIter<'a> {
    block: &'a [u8],
    remain: &'a [u8],
}

impl<'a> TokenIter<'a> {
    pub(crate) fn new(block: &'a [u8]) -> Self {
        Self {
            block,
            remain: block,
        }
    }

    /// Byte offset of the cursor, relative to the structure block start
    pub fn offset(&self) -> usize {
        self.block.len() - self.remain.len()
    }

    /// Decode the token at the cursor and advance past it
    pub fn next_token(&mut self) -> Result<Token<'a>, FdtError> {
        let offset = self.offset();
        let (remain, token) = Token::parse(self.remain).map_err(|_| FdtError::BadToken(offset))?;
        self.remain = remain;
        Ok(token)
    }
}
