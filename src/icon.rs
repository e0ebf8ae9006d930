//! Apple `.icns` to Windows `.ico`.
//!
//! An ICNS file is a big-endian container: the `icns` magic and total
//! length, then entries of `type (4) | length (4, header included) | data`.
//! Modern entries carry PNG payloads; older ones carry packed RGB, masks or
//! metadata, which are skipped. Frames are told apart by the PNG signature of
//! their payload, never by the entry type.

use anyhow::{bail, Context, Result};
use image::imageops::FilterType;
use std::fs;
use std::path::Path;

use crate::error::RepackError;
use crate::filesystem::write_atomic;

/// Sizes written into the Windows icon.
pub const ICO_SIZES: &[u32] = &[16, 24, 32, 48, 64, 128, 256];

const ICNS_MAGIC: &[u8; 4] = b"icns";
const PNG_SIGNATURE: &[u8; 8] = &[0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a];
const ENTRY_HEADER_LEN: usize = 8;

/// One entry of an ICNS container, borrowed from the file bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IcnsFrame<'a> {
    pub kind: [u8; 4],
    pub data: &'a [u8],
}

impl IcnsFrame<'_> {
    pub fn kind_str(&self) -> String {
        String::from_utf8_lossy(&self.kind).into_owned()
    }
}

pub fn is_png(data: &[u8]) -> bool {
    data.starts_with(PNG_SIGNATURE)
}

/// Walk the entries of an ICNS file.
///
/// A truncated trailing entry ends the walk instead of failing it.
pub fn parse_icns(data: &[u8]) -> Result<Vec<IcnsFrame<'_>>> {
    if data.len() < ENTRY_HEADER_LEN || &data[..4] != ICNS_MAGIC {
        bail!("not an ICNS file (missing 'icns' header)");
    }
    let declared = read_u32_be(&data[4..8]) as usize;
    let end = declared.clamp(ENTRY_HEADER_LEN, data.len());

    let mut frames = Vec::new();
    let mut offset = ENTRY_HEADER_LEN;
    while offset + ENTRY_HEADER_LEN <= end {
        let mut kind = [0u8; 4];
        kind.copy_from_slice(&data[offset..offset + 4]);
        let len = read_u32_be(&data[offset + 4..offset + 8]) as usize;
        if len < ENTRY_HEADER_LEN || offset + len > end {
            tracing::warn!(
                "ICNS entry '{}' at offset {offset} overruns the file, stopping",
                String::from_utf8_lossy(&kind)
            );
            break;
        }
        frames.push(IcnsFrame {
            kind,
            data: &data[offset + ENTRY_HEADER_LEN..offset + len],
        });
        offset += len;
    }
    Ok(frames)
}

/// Largest PNG payload; the first one wins a tie.
pub fn select_frame<'a, 'b>(frames: &'b [IcnsFrame<'a>]) -> Option<&'b IcnsFrame<'a>> {
    frames
        .iter()
        .filter(|frame| {
            let png = is_png(frame.data);
            if !png {
                tracing::debug!("skipping non-PNG icon frame '{}'", frame.kind_str());
            }
            png
        })
        .fold(None, |best: Option<&IcnsFrame<'a>>, frame| match best {
            Some(current) if current.data.len() >= frame.data.len() => Some(current),
            _ => Some(frame),
        })
}

/// Resize one PNG to every size in [`ICO_SIZES`] and pack them as an ICO.
pub fn png_to_ico(png: &[u8]) -> Result<Vec<u8>> {
    let img = image::load_from_memory(png).context("Failed to load PNG icon frame")?;

    let mut icon_dir = ico::IconDir::new(ico::ResourceType::Icon);
    for &size in ICO_SIZES {
        let rgba = img.resize_exact(size, size, FilterType::Lanczos3).to_rgba8();
        let image = ico::IconImage::from_rgba_data(size, size, rgba.into_raw());
        let entry = ico::IconDirEntry::encode(&image)
            .with_context(|| format!("Failed to encode {size}x{size} ICO entry"))?;
        icon_dir.add_entry(entry);
    }

    let mut buffer = Vec::new();
    icon_dir.write(&mut buffer).context("Failed to write ICO")?;
    Ok(buffer)
}

/// Convert the ICNS file at `icns_path` into an ICO at `ico_path`.
pub fn transcode(icns_path: &Path, ico_path: &Path) -> Result<()> {
    let data =
        fs::read(icns_path).with_context(|| format!("Failed to read {}", icns_path.display()))?;
    let frames =
        parse_icns(&data).with_context(|| format!("Failed to parse {}", icns_path.display()))?;
    let frame = select_frame(&frames).ok_or_else(|| RepackError::NoIconFrames {
        path: icns_path.to_path_buf(),
    })?;
    tracing::info!(
        "Using {} byte '{}' frame from {}",
        frame.data.len(),
        frame.kind_str(),
        icns_path.display()
    );

    let ico = png_to_ico(frame.data)?;
    write_atomic(ico_path, &ico)
}

fn read_u32_be(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[..4]);
    u32::from_be_bytes(buf)
}
