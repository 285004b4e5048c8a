use std::fmt::{Display, Formatter};

use crate::rules::RuleKind;

/// Coordinate scalar position (SEG-Y rev1, bytes 71-72).
pub const COORDINATE_SCALAR: u16 = 71;
/// Elevation and depth scalar position (bytes 69-70).
pub const ELEVATION_SCALAR: u16 = 69;
/// Shot point scalar position (bytes 201-202).
pub const SHOT_SCALAR: u16 = 201;

/// A logical trace header field.
///
/// Every key has a standard SEG-Y rev1 layout ([`Key::standard_kind`]); a rule set may map it
/// elsewhere for files that deviate from the standard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    /// Trace sequence number within the line.
    TraceSeqLine,
    /// Trace sequence number within the file.
    TraceSeqFile,
    /// Original field record number.
    FieldRecord,
    /// Trace number within the field record.
    TraceInRecord,
    /// Energy source point number.
    SourcePoint,
    /// Ensemble (CDP) number.
    Ensemble,
    /// Trace number within the ensemble.
    TraceInEnsemble,
    TraceId,
    /// Source to receiver distance.
    Offset,
    ReceiverElevation,
    SourceElevation,
    SourceDepth,
    ReceiverDatum,
    SourceDatum,
    WaterDepthSource,
    WaterDepthReceiver,
    SourceX,
    SourceY,
    ReceiverX,
    ReceiverY,
    CoordinateUnits,
    /// Samples in this trace.
    NumSamples,
    /// Sample interval of this trace in microseconds.
    SampleInterval,
    CmpX,
    CmpY,
    Inline,
    Crossline,
    ShotNumber,
    /// Position of the trace within the batch that decoded it.
    LocalTraceNumber,
    /// Position of the trace within the file.
    GlobalTraceNumber,
    /// The complete 240-byte header, carried verbatim.
    Copy,
}

impl Key {
    /// Every key, in header order.
    pub const ALL: [Key; 31] = [
        Key::TraceSeqLine,
        Key::TraceSeqFile,
        Key::FieldRecord,
        Key::TraceInRecord,
        Key::SourcePoint,
        Key::Ensemble,
        Key::TraceInEnsemble,
        Key::TraceId,
        Key::Offset,
        Key::ReceiverElevation,
        Key::SourceElevation,
        Key::SourceDepth,
        Key::ReceiverDatum,
        Key::SourceDatum,
        Key::WaterDepthSource,
        Key::WaterDepthReceiver,
        Key::SourceX,
        Key::SourceY,
        Key::ReceiverX,
        Key::ReceiverY,
        Key::CoordinateUnits,
        Key::NumSamples,
        Key::SampleInterval,
        Key::CmpX,
        Key::CmpY,
        Key::Inline,
        Key::Crossline,
        Key::ShotNumber,
        Key::LocalTraceNumber,
        Key::GlobalTraceNumber,
        Key::Copy,
    ];

    /// The SEG-Y rev1 layout of this key.
    pub const fn standard_kind(&self) -> RuleKind {
        use RuleKind::{Float, Index, LongInteger, RawCopy, ShortInteger};

        match self {
            Key::TraceSeqLine => LongInteger { location: 1 },
            Key::TraceSeqFile => LongInteger { location: 5 },
            Key::FieldRecord => LongInteger { location: 9 },
            Key::TraceInRecord => LongInteger { location: 13 },
            Key::SourcePoint => LongInteger { location: 17 },
            Key::Ensemble => LongInteger { location: 21 },
            Key::TraceInEnsemble => LongInteger { location: 25 },
            Key::TraceId => ShortInteger { location: 29 },
            Key::Offset => LongInteger { location: 37 },
            Key::ReceiverElevation => elevation(41),
            Key::SourceElevation => elevation(45),
            Key::SourceDepth => elevation(49),
            Key::ReceiverDatum => elevation(53),
            Key::SourceDatum => elevation(57),
            Key::WaterDepthSource => elevation(61),
            Key::WaterDepthReceiver => elevation(65),
            Key::SourceX => coordinate(73),
            Key::SourceY => coordinate(77),
            Key::ReceiverX => coordinate(81),
            Key::ReceiverY => coordinate(85),
            Key::CoordinateUnits => ShortInteger { location: 89 },
            Key::NumSamples => ShortInteger { location: 115 },
            Key::SampleInterval => ShortInteger { location: 117 },
            Key::CmpX => coordinate(181),
            Key::CmpY => coordinate(185),
            Key::Inline => LongInteger { location: 189 },
            Key::Crossline => LongInteger { location: 193 },
            Key::ShotNumber => Float {
                location: 197,
                scalar_location: SHOT_SCALAR,
            },
            Key::LocalTraceNumber | Key::GlobalTraceNumber => Index,
            Key::Copy => RawCopy,
        }
    }

    /// Keys whose values come from the trace's position rather than its header bytes.
    pub fn is_index(&self) -> bool {
        matches!(self, Key::LocalTraceNumber | Key::GlobalTraceNumber)
    }

    pub fn is_copy(&self) -> bool {
        matches!(self, Key::Copy)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Key::TraceSeqLine => "trace_seq_line",
            Key::TraceSeqFile => "trace_seq_file",
            Key::FieldRecord => "field_record",
            Key::TraceInRecord => "trace_in_record",
            Key::SourcePoint => "source_point",
            Key::Ensemble => "ensemble",
            Key::TraceInEnsemble => "trace_in_ensemble",
            Key::TraceId => "trace_id",
            Key::Offset => "offset",
            Key::ReceiverElevation => "receiver_elevation",
            Key::SourceElevation => "source_elevation",
            Key::SourceDepth => "source_depth",
            Key::ReceiverDatum => "receiver_datum",
            Key::SourceDatum => "source_datum",
            Key::WaterDepthSource => "water_depth_source",
            Key::WaterDepthReceiver => "water_depth_receiver",
            Key::SourceX => "source_x",
            Key::SourceY => "source_y",
            Key::ReceiverX => "receiver_x",
            Key::ReceiverY => "receiver_y",
            Key::CoordinateUnits => "coordinate_units",
            Key::NumSamples => "num_samples",
            Key::SampleInterval => "sample_interval",
            Key::CmpX => "cmp_x",
            Key::CmpY => "cmp_y",
            Key::Inline => "inline",
            Key::Crossline => "crossline",
            Key::ShotNumber => "shot_number",
            Key::LocalTraceNumber => "local_trace_number",
            Key::GlobalTraceNumber => "global_trace_number",
            Key::Copy => "copy",
        }
    }
}

const fn coordinate(location: u16) -> RuleKind {
    RuleKind::Float {
        location,
        scalar_location: COORDINATE_SCALAR,
    }
}

const fn elevation(location: u16) -> RuleKind {
    RuleKind::Float {
        location,
        scalar_location: ELEVATION_SCALAR,
    }
}

impl Display for Key {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
