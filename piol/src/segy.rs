//! The fixed SEG-Y byte layout: file header, binary header fields, trace layout and the
//! sample number formats.

use std::fmt::{Display, Formatter};

use piol_error::{PiolResult, piol_bail, piol_err};

/// Size of the free-text (EBCDIC or ASCII) file header.
pub const TEXT_HEADER_SIZE: u64 = 3200;
/// Size of the binary file header that follows the text header.
pub const BINARY_HEADER_SIZE: u64 = 400;
/// Size of the complete file header. The first trace starts here.
pub const FILE_HEADER_SIZE: u64 = TEXT_HEADER_SIZE + BINARY_HEADER_SIZE;
pub(crate) const TEXT_HEADER_LEN: usize = 3200;
pub(crate) const FILE_HEADER_LEN: usize = 3600;
/// Size of every trace header.
pub const TRACE_HEADER_SIZE: usize = 240;

// Binary header fields, as 1-based byte positions within the file.
const SAMPLE_INTERVAL_POS: usize = 3217;
const NUM_SAMPLES_POS: usize = 3221;
const FORMAT_POS: usize = 3225;

/// Encoding of the trace samples, from the binary header's format code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumberFormat {
    /// 4-byte IBM System/360 hexadecimal floating point.
    IbmFloat32,
    /// 4-byte two's complement integer.
    Int32,
    /// 2-byte two's complement integer.
    Int16,
    /// 4-byte IEEE 754 floating point.
    IeeeFloat32,
    /// 1-byte two's complement integer.
    Int8,
}

impl NumberFormat {
    pub fn from_code(code: i16) -> PiolResult<Self> {
        Ok(match code {
            1 => Self::IbmFloat32,
            2 => Self::Int32,
            3 => Self::Int16,
            5 => Self::IeeeFloat32,
            8 => Self::Int8,
            _ => piol_bail!(FormatError: "unsupported sample format code {code}"),
        })
    }

    pub fn code(&self) -> i16 {
        match self {
            Self::IbmFloat32 => 1,
            Self::Int32 => 2,
            Self::Int16 => 3,
            Self::IeeeFloat32 => 5,
            Self::Int8 => 8,
        }
    }

    /// Bytes per sample.
    pub fn sample_size(&self) -> usize {
        match self {
            Self::IbmFloat32 | Self::Int32 | Self::IeeeFloat32 => 4,
            Self::Int16 => 2,
            Self::Int8 => 1,
        }
    }

    /// Decode one big-endian sample. `bytes` must hold exactly one sample.
    pub fn decode_sample(&self, bytes: &[u8]) -> PiolResult<f32> {
        if bytes.len() != self.sample_size() {
            piol_bail!(FormatError: "sample of {} bytes for format {self}", bytes.len());
        }
        Ok(match self {
            Self::IbmFloat32 => ibm_to_ieee(u32::from_be_bytes(array(bytes)?)),
            Self::IeeeFloat32 => f32::from_bits(u32::from_be_bytes(array(bytes)?)),
            Self::Int32 => i32::from_be_bytes(array(bytes)?) as f32,
            Self::Int16 => f32::from(i16::from_be_bytes(array(bytes)?)),
            Self::Int8 => f32::from(i8::from_be_bytes(array(bytes)?)),
        })
    }

    /// Encode one sample big-endian into `out`, which must hold exactly one sample.
    pub fn encode_sample(&self, value: f32, out: &mut [u8]) -> PiolResult<()> {
        if out.len() != self.sample_size() {
            piol_bail!(FormatError: "sample of {} bytes for format {self}", out.len());
        }
        match self {
            Self::IbmFloat32 => out.copy_from_slice(&ieee_to_ibm(value).to_be_bytes()),
            Self::IeeeFloat32 => out.copy_from_slice(&value.to_bits().to_be_bytes()),
            Self::Int32 => out.copy_from_slice(&integer_sample::<i32>(value)?.to_be_bytes()),
            Self::Int16 => out.copy_from_slice(&integer_sample::<i16>(value)?.to_be_bytes()),
            Self::Int8 => out.copy_from_slice(&integer_sample::<i8>(value)?.to_be_bytes()),
        }
        Ok(())
    }
}

impl Display for NumberFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::IbmFloat32 => "ibm-float32",
            Self::Int32 => "int32",
            Self::Int16 => "int16",
            Self::IeeeFloat32 => "ieee-float32",
            Self::Int8 => "int8",
        };
        f.write_str(name)
    }
}

fn array<const N: usize>(bytes: &[u8]) -> PiolResult<[u8; N]> {
    bytes
        .try_into()
        .map_err(|_| piol_err!(FormatError: "expected {N} bytes, got {}", bytes.len()))
}

fn integer_sample<T: TryFrom<i64>>(value: f32) -> PiolResult<T> {
    let rounded = value.round();
    if !rounded.is_finite() {
        piol_bail!(NumericOverflow: "sample {value} is not finite");
    }
    #[allow(clippy::cast_possible_truncation)]
    let wide = rounded as i64;
    T::try_from(wide)
        .map_err(|_| piol_err!(NumericOverflow: "sample {value} does not fit the integer format"))
}

/// Convert an IBM System/360 single precision float to IEEE.
///
/// IBM floats have a 7-bit base-16 exponent biased by 64 and a 24-bit fraction in `[1/16, 1)`.
pub fn ibm_to_ieee(bits: u32) -> f32 {
    let negative = bits >> 31 == 1;
    let exponent = i32::try_from((bits >> 24) & 0x7f).unwrap_or_default();
    let fraction = bits & 0x00ff_ffff;
    if fraction == 0 {
        return if negative { -0.0 } else { 0.0 };
    }

    let value = f64::from(fraction) / f64::from(1u32 << 24) * 16f64.powi(exponent - 64);
    #[allow(clippy::cast_possible_truncation)]
    let value = value as f32;
    if negative { -value } else { value }
}

/// Convert an IEEE single precision float to IBM System/360, rounding the fraction to
/// nearest. Values beyond the IBM range saturate, values below it flush to zero.
pub fn ieee_to_ibm(value: f32) -> u32 {
    let sign = if value.is_sign_negative() { 0x8000_0000 } else { 0 };
    if value == 0.0 || value.is_nan() {
        return 0;
    }
    if value.is_infinite() {
        return sign | 0x7fff_ffff;
    }

    let mut magnitude = f64::from(value.abs());
    let mut exponent = 64i32;
    while magnitude >= 1.0 {
        magnitude /= 16.0;
        exponent += 1;
    }
    while magnitude < 1.0 / 16.0 {
        magnitude *= 16.0;
        exponent -= 1;
    }

    #[allow(clippy::cast_possible_truncation)]
    let mut fraction = (magnitude * f64::from(1u32 << 24)).round() as u32;
    if fraction == 1 << 24 {
        fraction >>= 4;
        exponent += 1;
    }

    match u32::try_from(exponent) {
        Ok(exponent) if exponent <= 127 => sign | (exponent << 24) | fraction,
        Ok(_) => sign | 0x7fff_ffff,
        Err(_) => sign,
    }
}

/// The fields of the binary file header PIOL interprets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryHeader {
    /// Samples per trace.
    pub num_samples: u16,
    /// Sample interval in microseconds.
    pub sample_interval: u16,
    pub format: NumberFormat,
}

impl BinaryHeader {
    /// Parse the binary header out of the complete 3600-byte file header.
    pub fn parse(file_header: &[u8]) -> PiolResult<Self> {
        Self::parse_with_format(file_header, None)
    }

    /// Parse the binary header, taking the sample format from `format` instead of the
    /// header's format code when given.
    pub fn parse_with_format(file_header: &[u8], format: Option<NumberFormat>) -> PiolResult<Self> {
        if file_header.len() < FILE_HEADER_LEN {
            piol_bail!(FormatError: "file header of {} bytes, expected {FILE_HEADER_SIZE}", file_header.len());
        }
        let num_samples = u16::from_be_bytes(array(&file_header[field(NUM_SAMPLES_POS, 2)])?);
        let sample_interval =
            u16::from_be_bytes(array(&file_header[field(SAMPLE_INTERVAL_POS, 2)])?);
        let format = match format {
            Some(format) => format,
            None => NumberFormat::from_code(i16::from_be_bytes(array(
                &file_header[field(FORMAT_POS, 2)],
            )?))?,
        };
        Ok(Self {
            num_samples,
            sample_interval,
            format,
        })
    }

    /// Write the interpreted fields into a 3600-byte file header, leaving other bytes as is.
    pub fn encode(&self, file_header: &mut [u8]) -> PiolResult<()> {
        if file_header.len() < FILE_HEADER_LEN {
            piol_bail!(FormatError: "file header of {} bytes, expected {FILE_HEADER_SIZE}", file_header.len());
        }
        file_header[field(NUM_SAMPLES_POS, 2)].copy_from_slice(&self.num_samples.to_be_bytes());
        file_header[field(SAMPLE_INTERVAL_POS, 2)]
            .copy_from_slice(&self.sample_interval.to_be_bytes());
        file_header[field(FORMAT_POS, 2)].copy_from_slice(&self.format.code().to_be_bytes());
        Ok(())
    }

    /// Sample interval in seconds.
    pub fn sample_interval_secs(&self) -> f64 {
        f64::from(self.sample_interval) * 1e-6
    }
}

/// Byte range of a field given its 1-based position.
pub(crate) fn field(position: usize, width: usize) -> std::ops::Range<usize> {
    position - 1..position - 1 + width
}

/// Placement of traces within a file with a given sample count and format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceLayout {
    num_samples: usize,
    format: NumberFormat,
}

impl TraceLayout {
    pub fn new(num_samples: usize, format: NumberFormat) -> Self {
        Self {
            num_samples,
            format,
        }
    }

    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    pub fn format(&self) -> NumberFormat {
        self.format
    }

    /// Bytes of sample data per trace.
    pub fn data_size(&self) -> u64 {
        (self.num_samples * self.format.sample_size()) as u64
    }

    /// Bytes per trace, header included.
    pub fn trace_size(&self) -> u64 {
        TRACE_HEADER_SIZE as u64 + self.data_size()
    }

    /// File position of the header of trace `index`.
    pub fn trace_offset(&self, index: u64) -> u64 {
        FILE_HEADER_SIZE + index * self.trace_size()
    }

    /// File position of the samples of trace `index`.
    pub fn samples_offset(&self, index: u64) -> u64 {
        self.trace_offset(index) + TRACE_HEADER_SIZE as u64
    }

    /// Number of whole traces in a file of `file_size` bytes, and the bytes left over.
    pub fn trace_count(&self, file_size: u64) -> (u64, u64) {
        let body = file_size.saturating_sub(FILE_HEADER_SIZE);
        (body / self.trace_size(), body % self.trace_size())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(0xC276_A000, -118.625)]
    #[case(0x4110_0000, 1.0)]
    #[case(0x4210_0000, 16.0)]
    #[case(0x4080_0000, 0.5)]
    #[case(0x0000_0000, 0.0)]
    fn ibm_known_values(#[case] bits: u32, #[case] expected: f32) {
        assert_eq!(ibm_to_ieee(bits), expected);
        assert_eq!(ieee_to_ibm(expected), bits);
    }

    #[test]
    fn ibm_saturates_and_flushes() {
        assert_eq!(ieee_to_ibm(f32::INFINITY), 0x7fff_ffff);
        assert_eq!(ieee_to_ibm(f32::NEG_INFINITY), 0xffff_ffff);
        assert_eq!(ieee_to_ibm(f32::NAN), 0);
    }

    #[test]
    fn ibm_round_trips_through_ieee() {
        for bits in [0x4276_A000u32, 0x3F10_0000, 0x4710_0001, 0xC1FF_FFFF] {
            assert_eq!(ieee_to_ibm(ibm_to_ieee(bits)), bits);
        }
    }

    #[rstest]
    #[case(NumberFormat::Int16, 3.0)]
    #[case(NumberFormat::Int32, -70000.0)]
    #[case(NumberFormat::Int8, -5.0)]
    #[case(NumberFormat::IeeeFloat32, 1.25)]
    #[case(NumberFormat::IbmFloat32, -118.625)]
    fn samples_encode_and_decode(#[case] format: NumberFormat, #[case] value: f32) {
        let mut buf = vec![0u8; format.sample_size()];
        format.encode_sample(value, &mut buf).unwrap();
        assert_eq!(format.decode_sample(&buf).unwrap(), value);
    }

    #[test]
    fn integer_sample_overflow() {
        let mut buf = [0u8; 2];
        assert!(NumberFormat::Int16.encode_sample(40000.0, &mut buf).is_err());
    }

    #[test]
    fn binary_header_fields() {
        let mut header = vec![0u8; FILE_HEADER_LEN];
        let binary = BinaryHeader {
            num_samples: 1001,
            sample_interval: 2000,
            format: NumberFormat::IeeeFloat32,
        };
        binary.encode(&mut header).unwrap();
        assert_eq!(&header[3220..3222], &1001u16.to_be_bytes());
        assert_eq!(&header[3224..3226], &5i16.to_be_bytes());
        assert_eq!(BinaryHeader::parse(&header).unwrap(), binary);
        assert!((binary.sample_interval_secs() - 0.002).abs() < 1e-12);
    }

    #[test]
    fn unknown_format_code() {
        let mut header = vec![0u8; FILE_HEADER_LEN];
        header[3224..3226].copy_from_slice(&4i16.to_be_bytes());
        assert!(BinaryHeader::parse(&header).is_err());
        let parsed = BinaryHeader::parse_with_format(&header, Some(NumberFormat::Int16)).unwrap();
        assert_eq!(parsed.format, NumberFormat::Int16);
    }

    #[test]
    fn trace_layout_positions() {
        let layout = TraceLayout::new(100, NumberFormat::IbmFloat32);
        assert_eq!(layout.trace_size(), 640);
        assert_eq!(layout.trace_offset(2), 3600 + 1280);
        assert_eq!(layout.samples_offset(0), 3840);
        assert_eq!(layout.trace_count(3600 + 640 * 5 + 7), (5, 7));
        assert_eq!(layout.trace_count(100), (0, 0));
    }
}
