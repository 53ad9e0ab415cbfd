//! SPIR-V for the framekit render systems.
//!
//! GLSL sources live in `shaders/` and are compiled by the build script.

use std::sync::OnceLock;

/// Embedded SPIR-V bytecode (raw bytes, may not be aligned).
mod spirv_bytes {
    pub static SIMPLE_VERT: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/simple_vert.spv"));
    pub static SIMPLE_FRAG: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/simple_frag.spv"));
}

/// Reassemble little-endian words; SPIR-V needs 4-byte alignment.
fn bytes_to_spirv(bytes: &[u8]) -> Vec<u32> {
    assert!(
        bytes.len() % 4 == 0,
        "SPIR-V bytecode must be a whole number of words"
    );
    bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

static SIMPLE_VERT_SPIRV: OnceLock<Vec<u32>> = OnceLock::new();
static SIMPLE_FRAG_SPIRV: OnceLock<Vec<u32>> = OnceLock::new();

/// Vertex stage of the flat-shaded object pipeline.
pub fn simple_vertex_shader() -> &'static [u32] {
    SIMPLE_VERT_SPIRV.get_or_init(|| bytes_to_spirv(spirv_bytes::SIMPLE_VERT))
}

/// Fragment stage of the flat-shaded object pipeline.
pub fn simple_fragment_shader() -> &'static [u32] {
    SIMPLE_FRAG_SPIRV.get_or_init(|| bytes_to_spirv(spirv_bytes::SIMPLE_FRAG))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPIRV_MAGIC: u32 = 0x0723_0203;

    #[test]
    fn shaders_load() {
        for shader in [simple_vertex_shader(), simple_fragment_shader()] {
            assert_eq!(shader[0], SPIRV_MAGIC, "Invalid SPIR-V magic number");
            assert!(shader.len() > 20, "Shader too small");
        }
    }

    #[test]
    fn words_are_little_endian() {
        assert_eq!(bytes_to_spirv(&[0x03, 0x02, 0x23, 0x07]), vec![SPIRV_MAGIC]);
    }
}
