//! Codec Information Element (CIE) framing
//!
//! Every CIE shares the same header:
//!
//! ```text
//! [LOSC][media_type << 4][codec_type][payload: LOSC - 2 bytes]
//! ```
//!
//! Vendor-specific CIEs start their payload with a 4-byte little-endian vendor
//! ID and a 2-byte little-endian codec ID. [`CieWriter`] and [`CieReader`] are
//! the only places that touch raw offsets; codec families read and write
//! fields through them.

use super::{A2dpError, CodecType, MediaType, codec::CodecFamily, config::CodecIndex};
use crate::constants::{
    APTX_CODEC_ID, APTX_HD_CODEC_ID, APTX_HD_VENDOR_ID, APTX_VENDOR_ID, AVDT_CODEC_SIZE,
    LDAC_CODEC_ID, LDAC_VENDOR_ID, VENDOR_HEADER_LEN,
};
use heapless::Vec;

/// Over-the-air codec information element, including the length octet
pub type CodecInfo = Vec<u8, AVDT_CODEC_SIZE>;

/// Structured writer for a codec information element
///
/// The header is written on construction; [`CieWriter::finish`] checks that
/// exactly `LOSC` bytes followed the length octet.
#[derive(Debug)]
pub struct CieWriter {
    buf: CodecInfo,
    losc: u8,
}

impl CieWriter {
    /// Start a new element with the given length octet, media type and codec type
    #[must_use]
    pub fn new(losc: u8, media_type: MediaType, codec_type: CodecType) -> Self {
        let mut writer = Self {
            buf: Vec::new(),
            losc,
        };
        // Three bytes always fit in AVDT_CODEC_SIZE
        let _ = writer.buf.extend_from_slice(&[
            losc,
            (media_type as u8) << 4,
            codec_type as u8,
        ]);
        writer
    }

    /// Start a vendor-specific element, writing the vendor and codec IDs
    ///
    /// # Errors
    /// Returns `InvalidParams` if the element would not fit
    pub fn vendor(
        losc: u8,
        media_type: MediaType,
        vendor_id: u32,
        codec_id: u16,
    ) -> Result<Self, A2dpError> {
        let mut writer = Self::new(losc, media_type, CodecType::VendorSpecific);
        writer.u32_le(vendor_id)?.u16_le(codec_id)?;
        Ok(writer)
    }

    /// Append one byte
    ///
    /// # Errors
    /// Returns `InvalidParams` if the buffer is full
    pub fn u8(&mut self, value: u8) -> Result<&mut Self, A2dpError> {
        self.buf.push(value).map_err(|_| A2dpError::InvalidParams)?;
        Ok(self)
    }

    /// Append a little-endian `u16`
    ///
    /// # Errors
    /// Returns `InvalidParams` if the buffer is full
    pub fn u16_le(&mut self, value: u16) -> Result<&mut Self, A2dpError> {
        self.bytes(&value.to_le_bytes())
    }

    /// Append a little-endian `u32`
    ///
    /// # Errors
    /// Returns `InvalidParams` if the buffer is full
    pub fn u32_le(&mut self, value: u32) -> Result<&mut Self, A2dpError> {
        self.bytes(&value.to_le_bytes())
    }

    /// Append a byte slice
    ///
    /// # Errors
    /// Returns `InvalidParams` if the buffer is full
    pub fn bytes(&mut self, value: &[u8]) -> Result<&mut Self, A2dpError> {
        self.buf
            .extend_from_slice(value)
            .map_err(|()| A2dpError::InvalidParams)?;
        Ok(self)
    }

    /// Finish the element
    ///
    /// # Errors
    /// Returns `InvalidParams` if the payload length disagrees with the length octet
    pub fn finish(self) -> Result<CodecInfo, A2dpError> {
        if self.buf.len() != usize::from(self.losc) + 1 {
            return Err(A2dpError::InvalidParams);
        }
        Ok(self.buf)
    }
}

/// Bounds-checked reader over a codec information element
#[derive(Debug, Clone)]
pub struct CieReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> CieReader<'a> {
    /// Validate the common header and position the reader at the payload
    ///
    /// Checks, in order: non-empty input, the family's fixed length octet, that
    /// the buffer actually holds `LOSC + 1` bytes, the audio media type, and
    /// the codec type.
    ///
    /// # Errors
    /// Returns `InvalidParams` for empty or truncated input and `WrongCodec`
    /// for a length, media type or codec type mismatch
    pub fn open(bytes: &'a [u8], losc: u8, codec_type: CodecType) -> Result<Self, A2dpError> {
        let Some(&len) = bytes.first() else {
            return Err(A2dpError::InvalidParams);
        };
        if len != losc {
            return Err(A2dpError::WrongCodec);
        }
        let total = usize::from(losc) + 1;
        if bytes.len() < total {
            return Err(A2dpError::InvalidParams);
        }
        let bytes = &bytes[..total];
        if bytes[1] >> 4 != MediaType::Audio as u8 || bytes[2] != codec_type as u8 {
            return Err(A2dpError::WrongCodec);
        }
        Ok(Self { bytes, pos: 3 })
    }

    /// Open a vendor-specific element and check its vendor and codec IDs
    ///
    /// # Errors
    /// As [`CieReader::open`], plus `WrongCodec` on an identifier mismatch
    pub fn open_vendor(
        bytes: &'a [u8],
        losc: u8,
        vendor_id: u32,
        codec_id: u16,
    ) -> Result<Self, A2dpError> {
        let mut reader = Self::open(bytes, losc, CodecType::VendorSpecific)?;
        if reader.u32_le()? != vendor_id || reader.u16_le()? != codec_id {
            return Err(A2dpError::WrongCodec);
        }
        Ok(reader)
    }

    /// Read one byte
    ///
    /// # Errors
    /// Returns `InvalidParams` past the end of the element
    pub fn u8(&mut self) -> Result<u8, A2dpError> {
        let value = *self.bytes.get(self.pos).ok_or(A2dpError::InvalidParams)?;
        self.pos += 1;
        Ok(value)
    }

    /// Read a little-endian `u16`
    ///
    /// # Errors
    /// Returns `InvalidParams` past the end of the element
    pub fn u16_le(&mut self) -> Result<u16, A2dpError> {
        Ok(u16::from_le_bytes([self.u8()?, self.u8()?]))
    }

    /// Read a little-endian `u32`
    ///
    /// # Errors
    /// Returns `InvalidParams` past the end of the element
    pub fn u32_le(&mut self) -> Result<u32, A2dpError> {
        Ok(u32::from_le_bytes([
            self.u8()?,
            self.u8()?,
            self.u8()?,
            self.u8()?,
        ]))
    }

    /// Bytes left in the element
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }
}

/// Media type of a CIE, if the element has a header
#[must_use]
pub fn media_type(info: &[u8]) -> Option<MediaType> {
    info.get(1).and_then(|b| MediaType::from_u8(b >> 4))
}

/// Codec type of a CIE, if the element has a header
#[must_use]
pub fn codec_type(info: &[u8]) -> Option<CodecType> {
    info.get(2).and_then(|b| CodecType::from_u8(*b))
}

/// Vendor and codec identifiers of a vendor-specific CIE
#[must_use]
pub fn vendor_ids(info: &[u8]) -> Option<(u32, u16)> {
    if codec_type(info) != Some(CodecType::VendorSpecific) {
        return None;
    }
    let ids = info.get(3..3 + VENDOR_HEADER_LEN)?;
    let vendor_id = u32::from_le_bytes([ids[0], ids[1], ids[2], ids[3]]);
    let codec_id = u16::from_le_bytes([ids[4], ids[5]]);
    Some((vendor_id, codec_id))
}

/// Codec index that would encode for a peer described by `info`
#[must_use]
pub fn source_codec_index(info: &[u8]) -> Option<CodecIndex> {
    match codec_type(info)? {
        CodecType::Sbc => Some(CodecIndex::SourceSbc),
        CodecType::Mpeg24Aac => Some(CodecIndex::SourceAac),
        CodecType::VendorSpecific => match vendor_ids(info)? {
            (APTX_VENDOR_ID, APTX_CODEC_ID) => Some(CodecIndex::SourceAptx),
            (APTX_HD_VENDOR_ID, APTX_HD_CODEC_ID) => Some(CodecIndex::SourceAptxHd),
            (LDAC_VENDOR_ID, LDAC_CODEC_ID) => Some(CodecIndex::SourceLdac),
            _ => None,
        },
        CodecType::Mpeg12Audio => None,
    }
}

/// Codec index that would decode for a peer described by `info`
#[must_use]
pub fn sink_codec_index(info: &[u8]) -> Option<CodecIndex> {
    match codec_type(info)? {
        CodecType::Sbc => Some(CodecIndex::SinkSbc),
        CodecType::Mpeg24Aac => Some(CodecIndex::SinkAac),
        CodecType::VendorSpecific => match vendor_ids(info)? {
            (LDAC_VENDOR_ID, LDAC_CODEC_ID) => Some(CodecIndex::SinkLdac),
            _ => None,
        },
        CodecType::Mpeg12Audio => None,
    }
}

/// Human readable codec name for a CIE
#[must_use]
pub fn codec_name(info: &[u8]) -> &'static str {
    match source_codec_index(info) {
        Some(index) => index.name(),
        None if codec_type(info) == Some(CodecType::VendorSpecific) => "UNKNOWN VENDOR CODEC",
        None => "UNKNOWN CODEC",
    }
}

/// Check whether `info` is a valid codec description in either
/// capability or configuration form
#[must_use]
pub fn is_valid_codec(info: &[u8]) -> bool {
    source_codec_index(info)
        .or_else(|| sink_codec_index(info))
        .is_some_and(|index| {
            let family = CodecFamily::for_index(index);
            family.is_valid(info, true) || family.is_valid(info, false)
        })
}

/// Compare two elements by their significant bytes
#[must_use]
pub fn codec_equals(a: &[u8], b: &[u8]) -> bool {
    match (a.first(), b.first()) {
        (Some(&la), Some(&lb)) if la == lb => {
            let total = usize::from(la) + 1;
            a.len() >= total && b.len() >= total && a[..total] == b[..total]
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CODEC_INFO_SBC: [u8; 7] = [6, 0, 0, 0x21, 0x15, 2, 53];
    const CODEC_INFO_AAC: [u8; 9] = [8, 0, 2, 0x80, 0x01, 0x04, 0x04, 0xE2, 0x00];
    const CODEC_INFO_NON_A2DP: [u8; 10] = [8, 0, 0xFF, 3, 4, 0, 0, 7, 8, 9];
    const CODEC_INFO_LDAC: [u8; 11] = [10, 0, 0xFF, 0x2D, 0x01, 0, 0, 0xAA, 0x00, 0x04, 0x01];

    #[test]
    fn test_writer_header_and_finish() {
        let mut writer = CieWriter::new(3, MediaType::Audio, CodecType::Sbc);
        writer.u8(0xAB).unwrap();
        let info = writer.finish().unwrap();
        assert_eq!(info.as_slice(), &[3, 0x00, 0x00, 0xAB]);
    }

    #[test]
    fn test_writer_rejects_short_payload() {
        let writer = CieWriter::new(6, MediaType::Audio, CodecType::Sbc);
        assert_eq!(writer.finish(), Err(A2dpError::InvalidParams));
    }

    #[test]
    fn test_writer_vendor_ids_little_endian() {
        let mut writer = CieWriter::vendor(8, MediaType::Audio, 0x0102_0304, 0x0506).unwrap();
        writer.u8(0x77).unwrap();
        let info = writer.finish().unwrap();
        assert_eq!(
            info.as_slice(),
            &[8, 0x00, 0xFF, 0x04, 0x03, 0x02, 0x01, 0x06, 0x05, 0x77]
        );
    }

    #[test]
    fn test_writer_overflow() {
        let mut writer = CieWriter::new(30, MediaType::Audio, CodecType::Sbc);
        let result = writer.bytes(&[0u8; AVDT_CODEC_SIZE]);
        assert_eq!(result.err(), Some(A2dpError::InvalidParams));
    }

    #[test]
    fn test_reader_open() {
        let mut reader = CieReader::open(&CODEC_INFO_SBC, 6, CodecType::Sbc).unwrap();
        assert_eq!(reader.remaining(), 4);
        assert_eq!(reader.u8().unwrap(), 0x21);
        assert_eq!(reader.u8().unwrap(), 0x15);
        assert_eq!(reader.u16_le().unwrap(), u16::from_le_bytes([2, 53]));
        assert_eq!(reader.u8(), Err(A2dpError::InvalidParams));
    }

    #[test]
    fn test_reader_structural_errors() {
        assert_eq!(
            CieReader::open(&[], 6, CodecType::Sbc).err(),
            Some(A2dpError::InvalidParams)
        );
        assert_eq!(
            CieReader::open(&CODEC_INFO_SBC[..4], 6, CodecType::Sbc).err(),
            Some(A2dpError::InvalidParams)
        );
        assert_eq!(
            CieReader::open(&CODEC_INFO_AAC, 6, CodecType::Sbc).err(),
            Some(A2dpError::WrongCodec)
        );
        let mut video = CODEC_INFO_SBC;
        video[1] = 0x10;
        assert_eq!(
            CieReader::open(&video, 6, CodecType::Sbc).err(),
            Some(A2dpError::WrongCodec)
        );
        let mut aac_tag = CODEC_INFO_SBC;
        aac_tag[2] = 0x02;
        assert_eq!(
            CieReader::open(&aac_tag, 6, CodecType::Sbc).err(),
            Some(A2dpError::WrongCodec)
        );
    }

    #[test]
    fn test_reader_ignores_trailing_bytes() {
        let mut padded = [0u8; AVDT_CODEC_SIZE];
        padded[..7].copy_from_slice(&CODEC_INFO_SBC);
        padded[7] = 0xEE;
        let reader = CieReader::open(&padded, 6, CodecType::Sbc).unwrap();
        assert_eq!(reader.remaining(), 4);
    }

    #[test]
    fn test_reader_vendor_mismatch() {
        assert_eq!(
            CieReader::open_vendor(&CODEC_INFO_NON_A2DP, 8, LDAC_VENDOR_ID, LDAC_CODEC_ID).err(),
            Some(A2dpError::WrongCodec)
        );
        assert!(CieReader::open_vendor(&CODEC_INFO_LDAC, 10, LDAC_VENDOR_ID, LDAC_CODEC_ID).is_ok());
    }

    #[test]
    fn test_header_helpers() {
        assert_eq!(media_type(&CODEC_INFO_SBC), Some(MediaType::Audio));
        assert_eq!(codec_type(&CODEC_INFO_AAC), Some(CodecType::Mpeg24Aac));
        assert_eq!(codec_type(&CODEC_INFO_NON_A2DP), Some(CodecType::VendorSpecific));
        assert_eq!(vendor_ids(&CODEC_INFO_NON_A2DP), Some((0x0000_0403, 0x0807)));
        assert_eq!(vendor_ids(&CODEC_INFO_SBC), None);
        assert_eq!(media_type(&[]), None);
    }

    #[test]
    fn test_codec_indices() {
        assert_eq!(source_codec_index(&CODEC_INFO_SBC), Some(CodecIndex::SourceSbc));
        assert_eq!(sink_codec_index(&CODEC_INFO_SBC), Some(CodecIndex::SinkSbc));
        assert_eq!(source_codec_index(&CODEC_INFO_AAC), Some(CodecIndex::SourceAac));
        assert_eq!(sink_codec_index(&CODEC_INFO_AAC), Some(CodecIndex::SinkAac));
        assert_eq!(source_codec_index(&CODEC_INFO_LDAC), Some(CodecIndex::SourceLdac));
        assert_eq!(sink_codec_index(&CODEC_INFO_LDAC), Some(CodecIndex::SinkLdac));
        assert_eq!(source_codec_index(&CODEC_INFO_NON_A2DP), None);
        assert_eq!(sink_codec_index(&CODEC_INFO_NON_A2DP), None);
    }

    #[test]
    fn test_codec_name() {
        assert_eq!(codec_name(&CODEC_INFO_SBC), "SBC");
        assert_eq!(codec_name(&CODEC_INFO_AAC), "AAC");
        assert_eq!(codec_name(&CODEC_INFO_LDAC), "LDAC");
        assert_eq!(codec_name(&CODEC_INFO_NON_A2DP), "UNKNOWN VENDOR CODEC");
    }

    #[test]
    fn test_is_valid_codec() {
        assert!(is_valid_codec(&CODEC_INFO_SBC));
        assert!(is_valid_codec(&[6, 0, 0, 0x3F, 0xFF, 2, 53]));
        assert!(is_valid_codec(&CODEC_INFO_AAC));
        assert!(is_valid_codec(&CODEC_INFO_LDAC));
        assert!(!is_valid_codec(&CODEC_INFO_NON_A2DP));
        assert!(!is_valid_codec(&[6, 0, 0, 0x00, 0x15, 2, 53]));
        assert!(!is_valid_codec(&[]));
    }

    #[test]
    fn test_codec_equals() {
        let mut padded = [0u8; AVDT_CODEC_SIZE];
        padded[..7].copy_from_slice(&CODEC_INFO_SBC);
        assert!(codec_equals(&CODEC_INFO_SBC, &padded));
        assert!(!codec_equals(&CODEC_INFO_SBC, &CODEC_INFO_AAC));
        assert!(!codec_equals(&[], &[]));
    }
}
