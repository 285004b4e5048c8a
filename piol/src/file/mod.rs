//! Reading and writing whole SEG-Y files from a group of workers.

mod read;
mod write;

pub use read::*;
pub use write::*;

use piol_error::{PiolResult, piol_bail};

use crate::segy::NumberFormat;

/// Converts the text header to ASCII.
pub trait TextDecoder {
    fn to_ascii(&self, text: &[u8]) -> Vec<u8>;
}

/// A text header that is already ASCII.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ascii;

impl TextDecoder for Ascii {
    fn to_ascii(&self, text: &[u8]) -> Vec<u8> {
        text.to_vec()
    }
}

/// Decode the samples of consecutive traces into `out`.
fn decode_samples(format: NumberFormat, bytes: &[u8], out: &mut [f32]) -> PiolResult<()> {
    let width = format.sample_size();
    if bytes.len() != out.len() * width {
        piol_bail!(FormatError: "{} sample bytes for {} samples of {format}", bytes.len(), out.len());
    }
    for (sample, chunk) in out.iter_mut().zip(bytes.chunks_exact(width)) {
        *sample = format.decode_sample(chunk)?;
    }
    Ok(())
}

fn encode_samples(format: NumberFormat, samples: &[f32], out: &mut [u8]) -> PiolResult<()> {
    let width = format.sample_size();
    for (&sample, chunk) in samples.iter().zip(out.chunks_exact_mut(width)) {
        format.encode_sample(sample, chunk)?;
    }
    Ok(())
}

/// Check `samples` holds `count` traces of `num_samples` each, returning the sample count.
fn sample_count(samples: usize, count: usize, num_samples: usize) -> PiolResult<usize> {
    let needed = count * num_samples;
    if samples < needed {
        piol_bail!("{count} traces of {num_samples} samples need {needed} samples, got {samples}");
    }
    Ok(needed)
}
