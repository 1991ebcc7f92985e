use std::io::{Error, ErrorKind};

use chrono::{DateTime, Datelike, NaiveDate, Utc};

use crate::{ExplorerProtocolError, H160, H256, U256};

/// Simple trait for types with a canonical encoding
pub trait Encode {
    /// Write the canonical encoding to the writer
    fn write_to<W>(&self, writer: &mut W) -> std::io::Result<usize>
    where
        W: std::io::Write;

    /// Serialize to a vec
    fn to_vec(&self) -> Vec<u8> {
        let mut buf = vec![];
        self.write_to(&mut buf).expect("!alloc");
        buf
    }
}

/// Simple trait for types with a canonical encoding
pub trait Decode {
    /// Try to read from some source
    fn read_from<R>(reader: &mut R) -> Result<Self, ExplorerProtocolError>
    where
        R: std::io::Read,
        Self: Sized;
}

macro_rules! impl_int_codec {
    ($($ty:ty),*) => {
        $(
            impl Encode for $ty {
                fn write_to<W>(&self, writer: &mut W) -> std::io::Result<usize>
                where
                    W: std::io::Write,
                {
                    writer.write_all(&self.to_be_bytes())?;
                    Ok(std::mem::size_of::<$ty>())
                }
            }

            impl Decode for $ty {
                fn read_from<R>(reader: &mut R) -> Result<Self, ExplorerProtocolError>
                where
                    R: std::io::Read,
                    Self: Sized,
                {
                    let mut buf = [0; std::mem::size_of::<$ty>()];
                    reader.read_exact(&mut buf)?;
                    Ok(<$ty>::from_be_bytes(buf))
                }
            }
        )*
    };
}

impl_int_codec!(u8, u16, u32, u64, i64);

impl Encode for H256 {
    fn write_to<W>(&self, writer: &mut W) -> std::io::Result<usize>
    where
        W: std::io::Write,
    {
        writer.write_all(self.as_ref())?;
        Ok(32)
    }
}

impl Decode for H256 {
    fn read_from<R>(reader: &mut R) -> Result<Self, ExplorerProtocolError>
    where
        R: std::io::Read,
        Self: Sized,
    {
        let mut digest = H256::default();
        reader.read_exact(digest.as_mut())?;
        Ok(digest)
    }
}

impl Encode for H160 {
    fn write_to<W>(&self, writer: &mut W) -> std::io::Result<usize>
    where
        W: std::io::Write,
    {
        writer.write_all(self.as_ref())?;
        Ok(20)
    }
}

impl Decode for H160 {
    fn read_from<R>(reader: &mut R) -> Result<Self, ExplorerProtocolError>
    where
        R: std::io::Read,
        Self: Sized,
    {
        let mut address = H160::default();
        reader.read_exact(address.as_mut())?;
        Ok(address)
    }
}

/// Big-endian, matching the on-chain payload layout.
impl Encode for U256 {
    fn write_to<W>(&self, writer: &mut W) -> std::io::Result<usize>
    where
        W: std::io::Write,
    {
        let mut buf = [0; 32];
        self.to_big_endian(&mut buf);
        writer.write_all(&buf)?;
        Ok(32)
    }
}

impl Decode for U256 {
    fn read_from<R>(reader: &mut R) -> Result<Self, ExplorerProtocolError>
    where
        R: std::io::Read,
        Self: Sized,
    {
        let mut buf = [0; 32];
        reader.read_exact(&mut buf)?;
        Ok(U256::from_big_endian(&buf))
    }
}

impl Encode for bool {
    fn write_to<W>(&self, writer: &mut W) -> std::io::Result<usize>
    where
        W: std::io::Write,
    {
        writer.write_all(&[u8::from(*self)])?;
        Ok(1)
    }
}

impl Decode for bool {
    fn read_from<R>(reader: &mut R) -> Result<Self, ExplorerProtocolError>
    where
        R: std::io::Read,
        Self: Sized,
    {
        match u8::read_from(reader)? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(ExplorerProtocolError::IoError(Error::new(
                ErrorKind::InvalidData,
                "decoded bool invalid",
            ))),
        }
    }
}

impl Encode for f64 {
    fn write_to<W>(&self, writer: &mut W) -> std::io::Result<usize>
    where
        W: std::io::Write,
    {
        self.to_bits().write_to(writer)
    }
}

impl Decode for f64 {
    fn read_from<R>(reader: &mut R) -> Result<Self, ExplorerProtocolError>
    where
        R: std::io::Read,
        Self: Sized,
    {
        Ok(f64::from_bits(u64::read_from(reader)?))
    }
}

/// Length prefixed with a u32.
impl<T: Encode> Encode for Vec<T> {
    fn write_to<W>(&self, writer: &mut W) -> std::io::Result<usize>
    where
        W: std::io::Write,
    {
        let mut written = (self.len() as u32).write_to(writer)?;
        for item in self {
            written += item.write_to(writer)?;
        }
        Ok(written)
    }
}

impl<T: Decode> Decode for Vec<T> {
    fn read_from<R>(reader: &mut R) -> Result<Self, ExplorerProtocolError>
    where
        R: std::io::Read,
        Self: Sized,
    {
        let len = u32::read_from(reader)?;
        (0..len).map(|_| T::read_from(reader)).collect()
    }
}

impl Encode for String {
    fn write_to<W>(&self, writer: &mut W) -> std::io::Result<usize>
    where
        W: std::io::Write,
    {
        let bytes = self.as_bytes();
        let written = (bytes.len() as u32).write_to(writer)?;
        writer.write_all(bytes)?;
        Ok(written + bytes.len())
    }
}

impl Decode for String {
    fn read_from<R>(reader: &mut R) -> Result<Self, ExplorerProtocolError>
    where
        R: std::io::Read,
        Self: Sized,
    {
        let len = u32::read_from(reader)? as usize;
        let mut buf = vec![0; len];
        reader.read_exact(&mut buf)?;
        Ok(String::from_utf8(buf)?)
    }
}

impl<T: Encode> Encode for Option<T> {
    fn write_to<W>(&self, writer: &mut W) -> std::io::Result<usize>
    where
        W: std::io::Write,
    {
        match self {
            Some(value) => Ok(true.write_to(writer)? + value.write_to(writer)?),
            None => false.write_to(writer),
        }
    }
}

impl<T: Decode> Decode for Option<T> {
    fn read_from<R>(reader: &mut R) -> Result<Self, ExplorerProtocolError>
    where
        R: std::io::Read,
        Self: Sized,
    {
        if bool::read_from(reader)? {
            Ok(Some(T::read_from(reader)?))
        } else {
            Ok(None)
        }
    }
}

/// Days since the common era, so that keys sort chronologically.
impl Encode for NaiveDate {
    fn write_to<W>(&self, writer: &mut W) -> std::io::Result<usize>
    where
        W: std::io::Write,
    {
        (self.num_days_from_ce() as u32).write_to(writer)
    }
}

impl Decode for NaiveDate {
    fn read_from<R>(reader: &mut R) -> Result<Self, ExplorerProtocolError>
    where
        R: std::io::Read,
        Self: Sized,
    {
        let days = u32::read_from(reader)?;
        i32::try_from(days)
            .ok()
            .and_then(NaiveDate::from_num_days_from_ce_opt)
            .ok_or_else(|| {
                ExplorerProtocolError::IoError(Error::new(
                    ErrorKind::InvalidData,
                    "decoded date out of range",
                ))
            })
    }
}

impl Encode for DateTime<Utc> {
    fn write_to<W>(&self, writer: &mut W) -> std::io::Result<usize>
    where
        W: std::io::Write,
    {
        self.timestamp().write_to(writer)
    }
}

impl Decode for DateTime<Utc> {
    fn read_from<R>(reader: &mut R) -> Result<Self, ExplorerProtocolError>
    where
        R: std::io::Read,
        Self: Sized,
    {
        let secs = i64::read_from(reader)?;
        DateTime::from_timestamp(secs, 0).ok_or_else(|| {
            ExplorerProtocolError::IoError(Error::new(
                ErrorKind::InvalidData,
                "decoded timestamp out of range",
            ))
        })
    }
}
