
//! The memory that pixels are read into and written from,
//! described per channel by a slice of typed pixel data.

use crate::error::{Error, Result, UnitResult};
use crate::math::Vec2;
use crate::meta::attribute::{IntegerBounds, SampleType, Text};
use half::f16;
use std::collections::BTreeMap;

/// A single value of one channel of one pixel.
///
/// The conversion methods on this type define how samples change
/// type when a file stores a channel in a different type than
/// the frame buffer: floats convert to integers by saturating
/// truncation of non-negative values, integers promote to floats
/// with rounding, and halves widen losslessly.
#[derive(Copy, Clone, Debug)]
pub enum Sample {

    /// An unsigned integer sample.
    U32(u32),

    /// A 16-bit float sample.
    F16(f16),

    /// A 32-bit float sample.
    F32(f32),
}

impl Sample {

    /// Convert the sample to an unsigned integer.
    /// Negative values and NaN become 0, values larger
    /// than the largest `u32` become the largest `u32`.
    #[inline]
    pub fn to_u32(self) -> u32 {
        match self {
            Sample::U32(sample) => sample,
            Sample::F16(sample) => sample.to_f32() as u32,
            Sample::F32(sample) => sample as u32,
        }
    }

    /// Convert the sample to a 16-bit float, rounding to the nearest
    /// representable value. Values outside of the `f16` range
    /// become infinity.
    #[inline]
    pub fn to_f16(self) -> f16 {
        match self {
            Sample::U32(sample) => f16::from_f32(sample as f32),
            Sample::F16(sample) => sample,
            Sample::F32(sample) => f16::from_f32(sample),
        }
    }

    /// Convert the sample to a 32-bit float.
    #[inline]
    pub fn to_f32(self) -> f32 {
        match self {
            Sample::U32(sample) => sample as f32,
            Sample::F16(sample) => sample.to_f32(),
            Sample::F32(sample) => sample,
        }
    }

    /// Convert this sample to the specified type.
    #[inline]
    pub fn convert_to(self, sample_type: SampleType) -> Sample {
        match sample_type {
            SampleType::U32 => Sample::U32(self.to_u32()),
            SampleType::F16 => Sample::F16(self.to_f16()),
            SampleType::F32 => Sample::F32(self.to_f32()),
        }
    }

    /// Create a sample of the specified type from an `f64`,
    /// for example from the fill value of a slice.
    #[inline]
    pub fn from_f64(value: f64, sample_type: SampleType) -> Sample {
        match sample_type {
            SampleType::U32 => Sample::U32(value as u32),
            SampleType::F16 => Sample::F16(f16::from_f64(value)),
            SampleType::F32 => Sample::F32(value as f32),
        }
    }

    /// The type of this sample.
    #[inline]
    pub fn sample_type(self) -> SampleType {
        match self {
            Sample::U32(_) => SampleType::U32,
            Sample::F16(_) => SampleType::F16,
            Sample::F32(_) => SampleType::F32,
        }
    }
}

impl From<u32> for Sample { #[inline] fn from(value: u32) -> Self { Sample::U32(value) } }
impl From<f16> for Sample { #[inline] fn from(value: f16) -> Self { Sample::F16(value) } }
impl From<f32> for Sample { #[inline] fn from(value: f32) -> Self { Sample::F32(value) } }

/// Compares the bits of the samples, not their numeric values.
/// Samples of different types are never equal.
impl PartialEq for Sample {
    fn eq(&self, other: &Self) -> bool {
        match (*self, *other) {
            (Sample::U32(own), Sample::U32(other)) => own == other,
            (Sample::F16(own), Sample::F16(other)) => own.to_bits() == other.to_bits(),
            (Sample::F32(own), Sample::F32(other)) => own.to_bits() == other.to_bits(),
            _ => false,
        }
    }
}


/// The pixel memory of a single channel.
///
/// The slice owns its bytes and describes how a pixel coordinate
/// maps into them: the byte index of the sample for the pixel
/// `(x, y)` is `(y - origin.y) * y_stride + (x - origin.x) * x_stride`.
/// All coordinates inside the window that the slice was created
/// with are valid.
#[derive(Clone, Debug, PartialEq)]
pub struct Slice {
    sample_type: SampleType,
    origin: Vec2<i32>,
    size: Vec2<usize>,
    x_stride: usize,
    y_stride: usize,
    x_sampling: usize,
    y_sampling: usize,
    fill_value: f64,
    data: Vec<u8>,
}

impl Slice {

    /// Allocate a zeroed slice that covers the specified window
    /// with densely packed samples of the specified type.
    pub fn new(sample_type: SampleType, window: IntegerBounds) -> Self {
        let bytes_per_sample = sample_type.bytes_per_sample();

        Slice {
            sample_type,
            origin: window.position,
            size: window.size,
            x_stride: bytes_per_sample,
            y_stride: bytes_per_sample * window.size.width(),
            x_sampling: 1,
            y_sampling: 1,
            fill_value: 0.0,
            data: vec![0_u8; bytes_per_sample * window.size.area()],
        }
    }

    /// Set the value that readers store in this slice
    /// where the file has no data for its channel.
    pub fn with_fill_value(mut self, fill_value: f64) -> Self {
        self.fill_value = fill_value;
        self
    }

    /// Set the subsampling rates of this slice.
    /// Tiled images require a sampling rate of (1, 1).
    pub fn with_sampling(mut self, sampling: Vec2<usize>) -> Self {
        self.x_sampling = sampling.x();
        self.y_sampling = sampling.y();
        self
    }

    /// The type of the samples in this slice.
    pub fn sample_type(&self) -> SampleType { self.sample_type }

    /// The pixel coordinate of the first sample in this slice.
    pub fn origin(&self) -> Vec2<i32> { self.origin }

    /// The subsampling rates of this slice.
    pub fn sampling(&self) -> Vec2<usize> { Vec2(self.x_sampling, self.y_sampling) }

    /// The value that readers store in this slice
    /// where the file has no data for its channel.
    pub fn fill_value(&self) -> f64 { self.fill_value }

    #[inline]
    fn byte_index(&self, x: i32, y: i32) -> usize {
        debug_assert!(
            x >= self.origin.x() && y >= self.origin.y()
                && ((x - self.origin.x()) as usize) < self.size.width()
                && ((y - self.origin.y()) as usize) < self.size.height(),
            "pixel coordinate ({}, {}) outside of slice window", x, y
        );

        (y - self.origin.y()) as usize * self.y_stride
            + (x - self.origin.x()) as usize * self.x_stride
    }

    /// The sample for the specified pixel coordinate.
    /// Panics for coordinates outside of the slice window.
    #[inline]
    pub fn sample(&self, x: i32, y: i32) -> Sample {
        let index = self.byte_index(x, y);
        let bytes = &self.data[index .. index + self.sample_type.bytes_per_sample()];

        match self.sample_type {
            SampleType::U32 => Sample::U32(u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
            SampleType::F16 => Sample::F16(f16::from_ne_bytes([bytes[0], bytes[1]])),
            SampleType::F32 => Sample::F32(f32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
        }
    }

    /// Store a sample for the specified pixel coordinate,
    /// converting it to the type of this slice if necessary.
    /// Panics for coordinates outside of the slice window.
    #[inline]
    pub fn set_sample(&mut self, x: i32, y: i32, sample: Sample) {
        let index = self.byte_index(x, y);
        let bytes = &mut self.data[index .. index + self.sample_type.bytes_per_sample()];

        match sample.convert_to(self.sample_type) {
            Sample::U32(value) => bytes.copy_from_slice(&value.to_ne_bytes()),
            Sample::F16(value) => bytes.copy_from_slice(&value.to_ne_bytes()),
            Sample::F32(value) => bytes.copy_from_slice(&value.to_ne_bytes()),
        }
    }

    /// Copy the samples for the pixels `(x_min ..= x_max, y)`
    /// from the other slice into this slice.
    /// Both slices must have the same sample type.
    pub(crate) fn copy_row_from(&mut self, source: &Slice, y: i32, x_min: i32, x_max: i32) {
        debug_assert_eq!(self.sample_type, source.sample_type, "slice type mismatch bug");
        let bytes_per_sample = self.sample_type.bytes_per_sample();

        for x in x_min ..= x_max {
            let to = self.byte_index(x, y);
            let from = source.byte_index(x, y);

            self.data[to .. to + bytes_per_sample]
                .copy_from_slice(&source.data[from .. from + bytes_per_sample]);
        }
    }
}


/// Maps each channel name to the pixel memory for that channel.
/// Iteration is ordered alphabetically by channel name,
/// matching the channel order of the files.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameBuffer {
    slices: BTreeMap<Text, Slice>,
}

impl FrameBuffer {

    /// Create an empty frame buffer.
    pub fn new() -> Self {
        FrameBuffer { slices: BTreeMap::new() }
    }

    /// Add a slice for the specified channel name.
    /// Replaces any existing slice of the same name.
    pub fn insert(&mut self, name: impl Into<Text>, slice: Slice) {
        self.slices.insert(name.into(), slice);
    }

    /// The slice for the specified channel name, if any.
    pub fn get(&self, name: &Text) -> Option<&Slice> {
        self.slices.get(name)
    }

    /// The mutable slice for the specified channel name, if any.
    pub fn get_mut(&mut self, name: &Text) -> Option<&mut Slice> {
        self.slices.get_mut(name)
    }

    /// The slice for the specified channel name, or a logic error.
    pub(crate) fn expect(&self, name: &Text) -> Result<&Slice> {
        self.slices.get(name)
            .ok_or_else(|| Error::logic("frame buffer changed after validation"))
    }

    /// The mutable slice for the specified channel name, or a logic error.
    pub(crate) fn expect_mut(&mut self, name: &Text) -> Result<&mut Slice> {
        self.slices.get_mut(name)
            .ok_or_else(|| Error::logic("frame buffer changed after validation"))
    }

    /// Iterate over all slices, ordered alphabetically by channel name.
    pub fn iter(&self) -> impl Iterator<Item = (&Text, &Slice)> {
        self.slices.iter()
    }

    /// Number of slices in this frame buffer.
    pub fn len(&self) -> usize {
        self.slices.len()
    }

    /// Whether this frame buffer contains no slices.
    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    /// All slices must use a sampling rate of (1, 1).
    /// Required for the slices of tiled images.
    pub(crate) fn validate_no_subsampling(&self) -> UnitResult {
        let all_samplings_are_one = self.slices.values()
            .all(|slice| slice.sampling() == Vec2(1, 1));

        if all_samplings_are_one { Ok(()) }
        else { Err(Error::argument("all slices of a tiled image must have sampling (1,1)")) }
    }
}
