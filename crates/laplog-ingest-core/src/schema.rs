//! Fixed-offset field tables and the little-endian reader that walks them.

use byteorder::{LittleEndian, ReadBytesExt};
use std::collections::BTreeMap;
use std::io::Cursor;

use crate::DecodeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    Float32,
    UInt8,
    Int32,
    Int16,
}

impl Primitive {
    pub const fn size(self) -> usize {
        match self {
            Primitive::Float32 | Primitive::Int32 => 4,
            Primitive::Int16 => 2,
            Primitive::UInt8 => 1,
        }
    }
}

/// `count` consecutive primitives starting at `offset`.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub offset: u32,
    pub count: u16,
    pub primitive: Primitive,
    pub name: &'static str,
}

impl FieldSpec {
    pub const fn new(offset: u32, count: u16, primitive: Primitive, name: &'static str) -> Self {
        Self { offset, count, primitive, name }
    }

    /// One past the last byte this field reads.
    pub const fn end(&self) -> usize {
        self.offset as usize + self.count as usize * self.primitive.size()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    F32(f32),
    U8(u8),
    I32(i32),
    I16(i16),
}

impl Value {
    pub fn as_f64(self) -> f64 {
        match self {
            Value::F32(v) => v as f64,
            Value::U8(v) => v as f64,
            Value::I32(v) => v as f64,
            Value::I16(v) => v as f64,
        }
    }

    /// Integer view; floats are truncated toward zero.
    pub fn as_i64(self) -> i64 {
        match self {
            Value::F32(v) => v as i64,
            Value::U8(v) => v as i64,
            Value::I32(v) => v as i64,
            Value::I16(v) => v as i64,
        }
    }
}

/// Decoded fields keyed by table name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldMap {
    fields: BTreeMap<&'static str, Vec<Value>>,
}

impl FieldMap {
    pub fn get(&self, name: &str) -> Option<&[Value]> {
        self.fields.get(name).map(Vec::as_slice)
    }

    pub fn value(&self, name: &'static str, index: usize) -> Result<Value, DecodeError> {
        self.get(name)
            .and_then(|v| v.get(index).copied())
            .ok_or(DecodeError::MissingField(name))
    }

    pub fn f64(&self, name: &'static str, index: usize) -> Result<f64, DecodeError> {
        self.value(name, index).map(Value::as_f64)
    }

    pub fn i64(&self, name: &'static str, index: usize) -> Result<i64, DecodeError> {
        self.value(name, index).map(Value::as_i64)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &[Value])> {
        self.fields.iter().map(|(k, v)| (*k, v.as_slice()))
    }
}

/// Read every field of `table` out of `buf`.
pub fn decode_fields(buf: &[u8], table: &[FieldSpec]) -> Result<FieldMap, DecodeError> {
    let mut fields = BTreeMap::new();
    for spec in table {
        let end = spec.end();
        if end > buf.len() {
            return Err(DecodeError::Truncated { needed: end, len: buf.len() });
        }
        let short = |_| DecodeError::Truncated { needed: end, len: buf.len() };
        let mut c = Cursor::new(&buf[spec.offset as usize..end]);
        let mut values = Vec::with_capacity(spec.count as usize);
        for _ in 0..spec.count {
            let v = match spec.primitive {
                Primitive::Float32 => Value::F32(c.read_f32::<LittleEndian>().map_err(short)?),
                Primitive::UInt8 => Value::U8(c.read_u8().map_err(short)?),
                Primitive::Int32 => Value::I32(c.read_i32::<LittleEndian>().map_err(short)?),
                Primitive::Int16 => Value::I16(c.read_i16::<LittleEndian>().map_err(short)?),
            };
            values.push(v);
        }
        fields.insert(spec.name, values);
    }
    Ok(FieldMap { fields })
}

/// Largest end offset across the table.
pub fn table_extent(table: &[FieldSpec]) -> usize {
    table.iter().map(FieldSpec::end).max().unwrap_or(0)
}
