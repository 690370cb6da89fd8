//! Opcode set and byte-level instruction encoding.
//!
//! Opcodes are single bytes. Constant, global and local indices are one-byte
//! operands; jump targets are two-byte big-endian absolute offsets.

use std::fmt;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Constant = 0,
    Add = 1,
    Sub = 2,
    Mul = 3,
    Div = 4,
    Pop = 5,
    True = 6,
    False = 7,
    Equal = 8,
    NotEqual = 9,
    GreaterThan = 10,
    LessThan = 11,
    Not = 12,
    Negate = 13,
    JumpIfNotTrue = 14,
    Nil = 15,
    Jump = 16,
    Modulo = 17,
    SetGlobal = 18,
    GetGlobal = 19,
    Call = 20,
    Return = 21,
    GetLocal = 22,
}

/// Written at jump sites until the real target is known.
pub const JUMP_PLACEHOLDER: u16 = 0xFFFF;

impl Opcode {
    pub fn name(self) -> &'static str {
        match self {
            Opcode::Constant => "CONSTANT",
            Opcode::Add => "ADD",
            Opcode::Sub => "SUB",
            Opcode::Mul => "MUL",
            Opcode::Div => "DIV",
            Opcode::Pop => "POP",
            Opcode::True => "TRUE",
            Opcode::False => "FALSE",
            Opcode::Equal => "EQUAL",
            Opcode::NotEqual => "NOT_EQUAL",
            Opcode::GreaterThan => "GT",
            Opcode::LessThan => "LT",
            Opcode::Not => "NOT",
            Opcode::Negate => "NEGATE",
            Opcode::JumpIfNotTrue => "JUMP_IF_NOT_TRUE",
            Opcode::Nil => "NIL",
            Opcode::Jump => "JUMP",
            Opcode::Modulo => "MODULO",
            Opcode::SetGlobal => "SET_GLOBAL",
            Opcode::GetGlobal => "GET_GLOBAL",
            Opcode::Call => "CALL",
            Opcode::Return => "RETURN",
            Opcode::GetLocal => "GET_LOCAL",
        }
    }

    /// Byte width of each operand that follows the opcode.
    pub fn operand_widths(self) -> &'static [usize] {
        match self {
            Opcode::Constant | Opcode::SetGlobal | Opcode::GetGlobal | Opcode::GetLocal => &[1],
            Opcode::JumpIfNotTrue | Opcode::Jump => &[2],
            _ => &[],
        }
    }

    /// Opcode byte plus operands.
    pub fn encoded_len(self) -> usize {
        1 + self.operand_widths().iter().sum::<usize>()
    }
}

impl TryFrom<u8> for Opcode {
    type Error = u8;

    /// Decode an opcode byte, handing back bytes that name no opcode.
    fn try_from(byte: u8) -> Result<Self, u8> {
        use Opcode::*;
        Ok(match byte {
            0 => Constant,
            1 => Add,
            2 => Sub,
            3 => Mul,
            4 => Div,
            5 => Pop,
            6 => True,
            7 => False,
            8 => Equal,
            9 => NotEqual,
            10 => GreaterThan,
            11 => LessThan,
            12 => Not,
            13 => Negate,
            14 => JumpIfNotTrue,
            15 => Nil,
            16 => Jump,
            17 => Modulo,
            18 => SetGlobal,
            19 => GetGlobal,
            20 => Call,
            21 => Return,
            22 => GetLocal,
            _ => return Err(byte),
        })
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Encode one instruction. Operands wider than their slot are truncated,
/// so callers check ranges first.
pub fn make(op: Opcode, operands: &[usize]) -> Vec<u8> {
    let widths = op.operand_widths();
    debug_assert_eq!(widths.len(), operands.len(), "{op} takes {} operand(s)", widths.len());
    let mut out = Vec::with_capacity(op.encoded_len());
    out.push(op as u8);
    for (&operand, &width) in operands.iter().zip(widths) {
        match width {
            1 => out.push(operand as u8),
            2 => out.extend_from_slice(&(operand as u16).to_be_bytes()),
            _ => unreachable!("operand widths are 1 or 2"),
        }
    }
    out
}

/// A growable, indexable instruction block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Instructions(Vec<u8>);

impl Instructions {
    pub fn new() -> Self {
        Instructions(Vec::new())
    }

    /// Append an encoded instruction, returning its starting offset.
    pub fn push(&mut self, op: Opcode, operands: &[usize]) -> usize {
        let position = self.0.len();
        self.0.extend(make(op, operands));
        position
    }

    pub fn truncate(&mut self, len: usize) {
        self.0.truncate(len);
    }

    /// Overwrite the two-byte operand of the instruction at `position` in place.
    pub fn patch_u16(&mut self, position: usize, value: u16) {
        self.0[position + 1..position + 3].copy_from_slice(&value.to_be_bytes());
    }

    pub fn read_u8(&self, offset: usize) -> Option<u8> {
        self.0.get(offset).copied()
    }

    pub fn read_u16(&self, offset: usize) -> Option<u16> {
        let bytes = self.0.get(offset..offset + 2)?;
        Some(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for Instructions {
    fn from(bytes: Vec<u8>) -> Self {
        Instructions(bytes)
    }
}

impl FromIterator<Vec<u8>> for Instructions {
    fn from_iter<I: IntoIterator<Item = Vec<u8>>>(iter: I) -> Self {
        Instructions(iter.into_iter().flatten().collect())
    }
}

/// Disassembly, one instruction per line: `0003 JUMP 12`.
impl fmt::Display for Instructions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut offset = 0;
        while offset < self.0.len() {
            let byte = self.0[offset];
            let Ok(op) = Opcode::try_from(byte) else {
                writeln!(f, "{offset:04} <unknown opcode {byte}>")?;
                offset += 1;
                continue;
            };
            write!(f, "{offset:04} {op}")?;
            let mut at = offset + 1;
            for &width in op.operand_widths() {
                let operand = match width {
                    1 => self.read_u8(at).map(usize::from),
                    _ => self.read_u16(at).map(usize::from),
                };
                match operand {
                    Some(v) => write!(f, " {v}")?,
                    None => write!(f, " <truncated>")?,
                }
                at += width;
            }
            writeln!(f)?;
            offset = at;
        }
        Ok(())
    }
}
