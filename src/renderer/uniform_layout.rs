//! Byte layout of the uniform blocks shared with the WGSL shaders.
//!
//! Offsets are never written by hand: each block is described once as an ordered
//! list of `(size, alignment, name)` fields and [`StructLayout::compute`] derives the
//! padded offsets and total size. The same layout sizes the GPU buffer and locates
//! the fields for partial writes.

use anyhow::{anyhow, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayoutField {
    pub size: u64,
    pub align: u64,
    pub name: Option<&'static str>,
}

impl LayoutField {
    pub const fn named(name: &'static str, size: u64, align: u64) -> Self {
        Self { size, align, name: Some(name) }
    }

    pub const fn unnamed(size: u64, align: u64) -> Self {
        Self { size, align, name: None }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StructLayout {
    offsets: Vec<(&'static str, u64)>,
    size: u64,
    max_align: u64,
}

impl StructLayout {
    pub fn compute(fields: &[LayoutField]) -> Self {
        let mut offsets = Vec::with_capacity(fields.len());
        let mut offset = 0u64;
        let mut max_align = 1u64;
        for field in fields {
            let align = field.align.max(1);
            max_align = max_align.max(align);
            offset = align_to(offset, align);
            if let Some(name) = field.name {
                offsets.push((name, offset));
            }
            offset += field.size;
        }
        Self { offsets, size: align_to(offset, max_align), max_align }
    }

    /// Total block size, padded to a multiple of the largest field alignment.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn max_align(&self) -> u64 {
        self.max_align
    }

    pub fn offset(&self, name: &str) -> Option<u64> {
        self.offsets.iter().find(|(field, _)| *field == name).map(|(_, offset)| *offset)
    }

    pub fn field_offset(&self, name: &str) -> Result<u64> {
        self.offset(name).ok_or_else(|| anyhow!("Uniform block has no field named '{name}'"))
    }

    pub fn fields(&self) -> impl Iterator<Item = (&'static str, u64)> + '_ {
        self.offsets.iter().copied()
    }
}

/// Rounds `value` up to the next multiple of `align`.
pub const fn align_to(value: u64, align: u64) -> u64 {
    if align <= 1 {
        return value;
    }
    value.div_ceil(align) * align
}

pub const MAT4_SIZE: u64 = 64;
pub const VEC4_SIZE: u64 = 16;
pub const F32_SIZE: u64 = 4;

pub mod fields {
    pub const VIEW_PROJECTION: &str = "view_projection";
    pub const POSITION: &str = "position";
    pub const DIRECTION: &str = "direction";
    pub const COLOR: &str = "color";
    pub const AMBIENT_INTENSITY: &str = "ambient_intensity";
    pub const DEBUG_SHOW_CASCADES: &str = "debug_show_cascades";
    pub const MIN_BIAS: &str = "min_bias";
    pub const MAX_BIAS: &str = "max_bias";
    pub const PCF_RADIUS: &str = "pcf_radius";
    pub const MODEL: &str = "model";
    pub const NORMAL_MODEL: &str = "normal_model";
    pub const SHININESS: &str = "shininess";
    pub const SPECULAR_INTENSITY: &str = "specular_intensity";
}

/// Camera block: view-projection matrix followed by the world position as a vec4.
pub fn camera_block() -> StructLayout {
    StructLayout::compute(&[
        LayoutField::named(fields::VIEW_PROJECTION, MAT4_SIZE, 16),
        LayoutField::named(fields::POSITION, VEC4_SIZE, 16),
    ])
}

/// Light block for a single shadow map.
pub fn simple_light_block() -> StructLayout {
    StructLayout::compute(&[
        LayoutField::named(fields::VIEW_PROJECTION, MAT4_SIZE, 16),
        LayoutField::named(fields::DIRECTION, VEC4_SIZE, 16),
        LayoutField::named(fields::COLOR, VEC4_SIZE, 16),
        LayoutField::named(fields::AMBIENT_INTENSITY, F32_SIZE, 4),
    ])
}

/// Light block for the cascade atlas: the cascade matrices are packed contiguously.
pub fn cascaded_light_block(cascades: usize) -> StructLayout {
    let cascades = cascades as u64;
    StructLayout::compute(&[
        LayoutField::named(fields::VIEW_PROJECTION, MAT4_SIZE * cascades, cascades * 16),
        LayoutField::named(fields::DIRECTION, VEC4_SIZE, 16),
        LayoutField::named(fields::COLOR, VEC4_SIZE, 16),
        LayoutField::named(fields::AMBIENT_INTENSITY, F32_SIZE, 4),
        LayoutField::named(fields::DEBUG_SHOW_CASCADES, F32_SIZE, 4),
    ])
}

pub fn shadow_params_block() -> StructLayout {
    StructLayout::compute(&[
        LayoutField::named(fields::MIN_BIAS, F32_SIZE, 4),
        LayoutField::named(fields::MAX_BIAS, F32_SIZE, 4),
        LayoutField::named(fields::PCF_RADIUS, F32_SIZE, 4),
    ])
}

pub fn renderable_block() -> StructLayout {
    StructLayout::compute(&[
        LayoutField::named(fields::MODEL, MAT4_SIZE, 16),
        LayoutField::named(fields::NORMAL_MODEL, MAT4_SIZE, 16),
        LayoutField::named(fields::COLOR, VEC4_SIZE, 16),
        LayoutField::named(fields::SHININESS, F32_SIZE, 4),
        LayoutField::named(fields::SPECULAR_INTENSITY, F32_SIZE, 4),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matrix_direction_ambient_example() {
        let layout = StructLayout::compute(&[
            LayoutField::named("m", 64, 16),
            LayoutField::named("d", 16, 16),
            LayoutField::named("a", 4, 4),
        ]);
        assert_eq!(layout.offset("m"), Some(0));
        assert_eq!(layout.offset("d"), Some(64));
        assert_eq!(layout.offset("a"), Some(80));
        assert_eq!(layout.size(), 96);
    }

    #[test]
    fn offsets_respect_alignment_and_size_is_padded() {
        let sequences: [&[(u64, u64)]; 5] = [
            &[(4, 4), (16, 16), (4, 4)],
            &[(4, 4), (4, 4), (4, 4)],
            &[(12, 4), (8, 8), (64, 16), (4, 4)],
            &[(2, 2), (256, 64), (16, 16), (1, 1)],
            &[(4, 4), (8, 8), (4, 4), (8, 8), (12, 16)],
        ];
        for sequence in sequences {
            let named = ["f0", "f1", "f2", "f3", "f4"];
            let fields: Vec<LayoutField> = sequence
                .iter()
                .zip(named)
                .map(|((size, align), name)| LayoutField::named(name, *size, *align))
                .collect();
            let layout = StructLayout::compute(&fields);
            let max_align = sequence.iter().map(|(_, align)| *align).max().unwrap_or(1);
            let mut previous_end = 0;
            for field in &fields {
                let offset = layout.offset(field.name.unwrap()).unwrap();
                assert_eq!(offset % field.align, 0, "{sequence:?}");
                assert!(offset >= previous_end, "fields must not overlap: {sequence:?}");
                previous_end = offset + field.size;
            }
            assert_eq!(layout.size() % max_align, 0, "{sequence:?}");
            assert!(layout.size() >= previous_end);
            assert!(layout.size() < previous_end + max_align);
        }
    }

    #[test]
    fn unnamed_fields_take_space_but_are_not_addressable() {
        let layout = StructLayout::compute(&[
            LayoutField::unnamed(4, 4),
            LayoutField::named("after", 16, 16),
        ]);
        assert_eq!(layout.offset("after"), Some(16));
        assert_eq!(layout.fields().count(), 1);
        assert_eq!(layout.size(), 32);
        assert!(layout.field_offset("missing").is_err());
    }

    #[test]
    fn empty_block_has_zero_size() {
        let layout = StructLayout::compute(&[]);
        assert_eq!(layout.size(), 0);
    }

    #[test]
    fn shader_blocks_match_wgsl_sizes() {
        assert_eq!(camera_block().size(), 80);
        assert_eq!(simple_light_block().size(), 112);
        assert_eq!(simple_light_block().offset(fields::AMBIENT_INTENSITY), Some(96));

        let cascaded = cascaded_light_block(4);
        assert_eq!(cascaded.offset(fields::DIRECTION), Some(256));
        assert_eq!(cascaded.offset(fields::COLOR), Some(272));
        assert_eq!(cascaded.offset(fields::AMBIENT_INTENSITY), Some(288));
        assert_eq!(cascaded.offset(fields::DEBUG_SHOW_CASCADES), Some(292));
        assert_eq!(cascaded.size(), 320);

        assert_eq!(shadow_params_block().size(), 12);
        assert_eq!(renderable_block().size(), 160);
        assert_eq!(renderable_block().offset(fields::SPECULAR_INTENSITY), Some(148));
    }

    #[test]
    fn align_to_rounds_up() {
        assert_eq!(align_to(0, 16), 0);
        assert_eq!(align_to(1, 16), 16);
        assert_eq!(align_to(16, 16), 16);
        assert_eq!(align_to(17, 4), 20);
        assert_eq!(align_to(7, 1), 7);
    }
}
