//! Container sniffing for downloaded segment bodies.
//!
//! Only enough of MPEG-TS and ISO-BMFF is decoded to tell which container a
//! segment uses, whether it carries audio and video, and whether the bytes
//! end on a clean packet or box boundary.

use std::collections::HashSet;

use thiserror::Error;

use crate::checker::MediaInfo;

pub const CONTAINER_TS: &str = "TS";
pub const CONTAINER_FMP4: &str = "fMP4";

const TS_PACKET_SIZE: usize = 188;
const TS_SYNC_BYTE: u8 = 0x47;
const PID_PAT: u16 = 0x0000;

const VIDEO_STREAM_TYPES: &[u8] = &[0x01, 0x02, 0x10, 0x1B, 0x24, 0x42, 0xEA];
const AUDIO_STREAM_TYPES: &[u8] = &[0x03, 0x04, 0x0F, 0x11, 0x81, 0x87];

const TOP_LEVEL_BOXES: &[&[u8; 4]] = &[
    b"ftyp", b"styp", b"moof", b"moov", b"sidx", b"mdat", b"emsg", b"prft",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    #[error("unrecognised container (leading bytes {0:02x?})")]
    UnknownContainer(Vec<u8>),
}

/// Identify the container of `data` and the tracks it carries.
///
/// An empty body yields a default [`MediaInfo`] so that size validation,
/// not the probe, reports it.
///
/// Tracks of an fMP4 body are only known from a `moov` box. Media
/// fragments (`moof`/`mdat` without an init segment) report neither video
/// nor audio, so `check_video`/`check_audio` policies fail for them.
pub fn probe(data: &[u8]) -> Result<MediaInfo, ProbeError> {
    if data.is_empty() {
        return Ok(MediaInfo::default());
    }
    if data[0] == TS_SYNC_BYTE {
        return Ok(probe_ts(data));
    }
    if data.len() >= 8 && TOP_LEVEL_BOXES.iter().any(|t| &data[4..8] == *t) {
        return Ok(probe_fmp4(data));
    }
    Err(ProbeError::UnknownContainer(
        data.iter().take(8).copied().collect(),
    ))
}

fn probe_ts(data: &[u8]) -> MediaInfo {
    let mut info = MediaInfo {
        container: CONTAINER_TS.to_string(),
        ..MediaInfo::default()
    };
    let mut complete = data.len() % TS_PACKET_SIZE == 0;
    let mut pmt_pids = HashSet::new();

    for packet in data.chunks(TS_PACKET_SIZE) {
        if packet.len() < TS_PACKET_SIZE {
            complete = false;
            break;
        }
        if packet[0] != TS_SYNC_BYTE {
            complete = false;
            continue;
        }

        let payload_start = packet[1] & 0x40 != 0;
        let pid = (u16::from(packet[1] & 0x1F) << 8) | u16::from(packet[2]);
        let adaptation_field_control = (packet[3] >> 4) & 0x03;

        // PSI tables are only read from packets that start a section.
        if !payload_start || adaptation_field_control & 0x01 == 0 {
            continue;
        }
        let mut offset = 4;
        if adaptation_field_control == 0x03 {
            offset += 1 + usize::from(packet[4]);
        }
        let Some(section) = psi_section(&packet[offset.min(TS_PACKET_SIZE)..]) else {
            continue;
        };

        if pid == PID_PAT {
            pmt_pids.extend(pat_program_pids(section));
        } else if pmt_pids.contains(&pid) {
            for stream_type in pmt_stream_types(section) {
                info.has_video |= VIDEO_STREAM_TYPES.contains(&stream_type);
                info.has_audio |= AUDIO_STREAM_TYPES.contains(&stream_type);
            }
        }
    }

    info.is_complete = complete;
    info
}

/// Skip the pointer field and return the section body, clamped to the
/// packet. Sections continuing in later packets are read partially.
fn psi_section(payload: &[u8]) -> Option<&[u8]> {
    let pointer = usize::from(*payload.first()?);
    let section = payload.get(1 + pointer..)?;
    if section.len() < 3 {
        return None;
    }
    let section_length = (usize::from(section[1] & 0x0F) << 8) | usize::from(section[2]);
    let end = (3 + section_length).min(section.len());
    Some(&section[..end])
}

/// Entries sit between the 8-byte header and the trailing CRC.
fn section_entries(section: &[u8], start: usize) -> &[u8] {
    let end = section.len().saturating_sub(4);
    section.get(start..end).unwrap_or(&[])
}

fn pat_program_pids(section: &[u8]) -> Vec<u16> {
    if section.first() != Some(&0x00) {
        return Vec::new();
    }
    section_entries(section, 8)
        .chunks_exact(4)
        .filter(|e| e[0] != 0 || e[1] != 0)
        .map(|e| (u16::from(e[2] & 0x1F) << 8) | u16::from(e[3]))
        .collect()
}

fn pmt_stream_types(section: &[u8]) -> Vec<u8> {
    if section.first() != Some(&0x02) || section.len() < 12 {
        return Vec::new();
    }
    let program_info_length = (usize::from(section[10] & 0x0F) << 8) | usize::from(section[11]);
    let entries = section_entries(section, 12 + program_info_length);

    let mut types = Vec::new();
    let mut pos = 0;
    while pos + 5 <= entries.len() {
        types.push(entries[pos]);
        let es_info_length =
            (usize::from(entries[pos + 3] & 0x0F) << 8) | usize::from(entries[pos + 4]);
        pos += 5 + es_info_length;
    }
    types
}

struct BoxHeader {
    kind: [u8; 4],
    header_len: usize,
    size: usize,
}

fn read_box_header(data: &[u8]) -> Option<BoxHeader> {
    let size32 = u32::from_be_bytes(data.get(0..4)?.try_into().ok()?);
    let kind: [u8; 4] = data.get(4..8)?.try_into().ok()?;
    let (header_len, size) = match size32 {
        0 => (8, data.len()),
        1 => {
            let large = u64::from_be_bytes(data.get(8..16)?.try_into().ok()?);
            (16, usize::try_from(large).ok()?)
        }
        n => (8, usize::try_from(n).ok()?),
    };
    if size < header_len {
        return None;
    }
    Some(BoxHeader {
        kind,
        header_len,
        size,
    })
}

fn probe_fmp4(data: &[u8]) -> MediaInfo {
    let mut info = MediaInfo {
        container: CONTAINER_FMP4.to_string(),
        ..MediaInfo::default()
    };

    let mut offset = 0;
    while offset < data.len() {
        let Some(header) = read_box_header(&data[offset..]) else {
            break;
        };
        let Some(end) = offset.checked_add(header.size).filter(|e| *e <= data.len()) else {
            break;
        };
        if &header.kind == b"moov" {
            scan_handlers(&data[offset + header.header_len..end], &mut info);
        }
        offset = end;
    }

    info.is_complete = offset == data.len();
    info
}

/// Walk `moov/trak/mdia` looking for `hdlr` boxes.
fn scan_handlers(mut data: &[u8], info: &mut MediaInfo) {
    while let Some(header) = read_box_header(data) {
        let Some(body) = data.get(header.header_len..header.size) else {
            return;
        };
        match &header.kind {
            b"trak" | b"mdia" => scan_handlers(body, info),
            // version/flags (4) + pre_defined (4) + handler_type (4)
            b"hdlr" => match body.get(8..12) {
                Some(b"vide") => info.has_video = true,
                Some(b"soun") => info.has_audio = true,
                _ => {}
            },
            _ => {}
        }
        data = &data[header.size..];
    }
}
