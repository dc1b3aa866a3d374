// Shared binary reading utilities for image and partition parsers
//
// Provides consistent little-endian reading from streams (EWF section
// descriptors) and from in-memory sectors (MBR, EBR and GPT structures)

use std::io::Read;

// =============================================================================
// Stream Read Functions (from current position)
// =============================================================================

/// Read u32 little-endian from a reader at its current position
pub fn read_u32_le<R: Read>(reader: &mut R) -> Result<u32, String> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)
        .map_err(|e| format!("Failed to read u32: {}", e))?;
    Ok(u32::from_le_bytes(buf))
}

/// Read u64 little-endian from a reader at its current position
pub fn read_u64_le<R: Read>(reader: &mut R) -> Result<u64, String> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)
        .map_err(|e| format!("Failed to read u64: {}", e))?;
    Ok(u64::from_le_bytes(buf))
}

// =============================================================================
// Slice Read Functions (bounds-checked, offset within a sector buffer)
// =============================================================================

/// Read u32 little-endian at `offset` within `bytes`
pub fn le_u32(bytes: &[u8], offset: usize) -> Result<u32, String> {
    let slice = bytes.get(offset..offset + 4)
        .ok_or_else(|| format!("u32 at offset {} beyond buffer of {} bytes", offset, bytes.len()))?;
    let mut buf = [0u8; 4];
    buf.copy_from_slice(slice);
    Ok(u32::from_le_bytes(buf))
}

/// Read u64 little-endian at `offset` within `bytes`
pub fn le_u64(bytes: &[u8], offset: usize) -> Result<u64, String> {
    let slice = bytes.get(offset..offset + 8)
        .ok_or_else(|| format!("u64 at offset {} beyond buffer of {} bytes", offset, bytes.len()))?;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(slice);
    Ok(u64::from_le_bytes(buf))
}

// =============================================================================
// String Decoding
// =============================================================================

/// Decode a NUL-padded UTF-16LE field (GPT partition names)
pub fn utf16le_to_string(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .take_while(|&unit| unit != 0)
        .collect();
    String::from_utf16_lossy(&units)
}

/// Convert bytes to NUL-terminated string (EWF section type names)
pub fn bytes_to_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).to_string()
}
