//! AMF0 编解码 (仅覆盖 FLV onMetaData 所需的子集).
//!
//! ```text
//! Number      0x00 + f64 (BE)
//! Boolean     0x01 + u8
//! String      0x02 + u16 长度 + UTF-8
//! Object      0x03 + (key, value)* + 0x00 0x00 0x09
//! Null        0x05
//! ECMA Array  0x08 + u32 计数 + (key, value)* + 0x00 0x00 0x09
//! StrictArray 0x0A + u32 计数 + value*
//! ```

use byteorder::{BigEndian, ByteOrder};
use ferry_core::{FerryError, FerryResult};

const AMF_NUMBER: u8 = 0x00;
const AMF_BOOLEAN: u8 = 0x01;
const AMF_STRING: u8 = 0x02;
const AMF_OBJECT: u8 = 0x03;
const AMF_NULL: u8 = 0x05;
const AMF_UNDEFINED: u8 = 0x06;
const AMF_ECMA_ARRAY: u8 = 0x08;
const AMF_OBJECT_END: u8 = 0x09;
const AMF_STRICT_ARRAY: u8 = 0x0A;
const AMF_DATE: u8 = 0x0B;
const AMF_LONG_STRING: u8 = 0x0C;

/// 嵌套层数上限, 防止恶意数据导致栈溢出
const MAX_DEPTH: usize = 16;

/// AMF0 值
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum AmfValue {
    Number(f64),
    Boolean(bool),
    String(String),
    Object(Vec<(String, AmfValue)>),
    Null,
    Array(Vec<AmfValue>),
}

impl AmfValue {
    pub(crate) fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub(crate) fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// 在对象/ECMA 数组中按键查找
    pub(crate) fn get(&self, key: &str) -> Option<&AmfValue> {
        match self {
            Self::Object(props) => props.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }
}

/// AMF0 读取器
pub(crate) struct AmfReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> AmfReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> FerryResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| FerryError::InvalidData("AMF: 数据被截断".into()))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_u8(&mut self) -> FerryResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn read_u16(&mut self) -> FerryResult<u16> {
        Ok(BigEndian::read_u16(self.take(2)?))
    }

    fn read_u32(&mut self) -> FerryResult<u32> {
        Ok(BigEndian::read_u32(self.take(4)?))
    }

    fn read_utf8(&mut self, len: usize) -> FerryResult<String> {
        Ok(String::from_utf8_lossy(self.take(len)?).into_owned())
    }

    fn read_short_string(&mut self) -> FerryResult<String> {
        let len = self.read_u16()? as usize;
        self.read_utf8(len)
    }

    /// 读取一个完整的 AMF0 值
    pub(crate) fn read_value(&mut self) -> FerryResult<AmfValue> {
        self.read_value_at(0)
    }

    fn read_value_at(&mut self, depth: usize) -> FerryResult<AmfValue> {
        if depth > MAX_DEPTH {
            return Err(FerryError::InvalidData("AMF: 嵌套层数过深".into()));
        }
        let marker = self.read_u8()?;
        match marker {
            AMF_NUMBER => Ok(AmfValue::Number(BigEndian::read_f64(self.take(8)?))),
            AMF_BOOLEAN => Ok(AmfValue::Boolean(self.read_u8()? != 0)),
            AMF_STRING => Ok(AmfValue::String(self.read_short_string()?)),
            AMF_LONG_STRING => {
                let len = self.read_u32()? as usize;
                Ok(AmfValue::String(self.read_utf8(len)?))
            }
            AMF_OBJECT => Ok(AmfValue::Object(self.read_properties(depth)?)),
            AMF_ECMA_ARRAY => {
                // 计数仅供参考, 以结束标记为准
                let _count = self.read_u32()?;
                Ok(AmfValue::Object(self.read_properties(depth)?))
            }
            AMF_STRICT_ARRAY => {
                let count = self.read_u32()? as usize;
                let mut items = Vec::new();
                for _ in 0..count {
                    items.push(self.read_value_at(depth + 1)?);
                }
                Ok(AmfValue::Array(items))
            }
            AMF_DATE => {
                let millis = BigEndian::read_f64(self.take(8)?);
                let _tz = self.read_u16()?;
                Ok(AmfValue::Number(millis))
            }
            AMF_NULL | AMF_UNDEFINED => Ok(AmfValue::Null),
            other => Err(FerryError::InvalidData(format!(
                "AMF: 不支持的类型标记 0x{other:02X}"
            ))),
        }
    }

    fn read_properties(&mut self, depth: usize) -> FerryResult<Vec<(String, AmfValue)>> {
        let mut props = Vec::new();
        loop {
            let key = self.read_short_string()?;
            if key.is_empty() {
                let end = self.read_u8()?;
                if end != AMF_OBJECT_END {
                    return Err(FerryError::InvalidData("AMF: 缺少对象结束标记".into()));
                }
                return Ok(props);
            }
            let value = self.read_value_at(depth + 1)?;
            props.push((key, value));
        }
    }
}

/// AMF0 写入器
#[derive(Default)]
pub(crate) struct AmfWriter {
    buf: Vec<u8>,
}

impl AmfWriter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn put_key(&mut self, key: &str) {
        let bytes = key.as_bytes();
        let len = bytes.len().min(u16::MAX as usize);
        self.buf.extend_from_slice(&(len as u16).to_be_bytes());
        self.buf.extend_from_slice(&bytes[..len]);
    }

    /// 写入 String 值
    pub(crate) fn string(&mut self, value: &str) {
        self.buf.push(AMF_STRING);
        self.put_key(value);
    }

    /// 开始一个 ECMA 数组
    pub(crate) fn begin_ecma_array(&mut self, count: u32) {
        self.buf.push(AMF_ECMA_ARRAY);
        self.buf.extend_from_slice(&count.to_be_bytes());
    }

    /// 写入数值属性, 返回该 f64 在缓冲区中的偏移 (用于回填)
    pub(crate) fn number_property(&mut self, key: &str, value: f64) -> usize {
        self.put_key(key);
        self.buf.push(AMF_NUMBER);
        let offset = self.buf.len();
        self.buf.extend_from_slice(&value.to_be_bytes());
        offset
    }

    pub(crate) fn bool_property(&mut self, key: &str, value: bool) {
        self.put_key(key);
        self.buf.push(AMF_BOOLEAN);
        self.buf.push(u8::from(value));
    }

    pub(crate) fn string_property(&mut self, key: &str, value: &str) {
        self.put_key(key);
        self.string(value);
    }

    /// 结束对象/ECMA 数组
    pub(crate) fn end_object(&mut self) {
        self.buf.extend_from_slice(&[0x00, 0x00, AMF_OBJECT_END]);
    }

    pub(crate) fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}
