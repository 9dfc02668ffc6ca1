//! NumPy `.npy`（v1.0, `<f4`, C 顺序）读写，形状固定为 (N, H, W, 3)

use super::error::DatasetError;
use crate::core::video::FrameSample;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

const MAGIC: &[u8] = b"\x93NUMPY";
const ALIGNMENT: usize = 64;

fn npy_error(path: &Path, reason: impl Into<String>) -> DatasetError {
    DatasetError::Npy {
        path: path.display().to_string(),
        reason: reason.into(),
    }
}

fn header_for(shape: [usize; 4]) -> Vec<u8> {
    let dict = format!(
        "{{'descr': '<f4', 'fortran_order': False, 'shape': ({}, {}, {}, {}), }}",
        shape[0], shape[1], shape[2], shape[3]
    );
    // magic(6) + version(2) + len(2) + dict + padding + '\n' 对齐到 64 字节
    let unpadded = MAGIC.len() + 4 + dict.len() + 1;
    let padding = (ALIGNMENT - unpadded % ALIGNMENT) % ALIGNMENT;

    let mut header = dict.into_bytes();
    header.extend(std::iter::repeat(b' ').take(padding));
    header.push(b'\n');
    header
}

pub fn write_npy(path: &Path, sample: &FrameSample) -> Result<(), DatasetError> {
    let header = header_for(sample.shape());
    let header_len = u16::try_from(header.len())
        .map_err(|_| npy_error(path, "header too long"))?;

    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(MAGIC)?;
    writer.write_all(&[1, 0])?;
    writer.write_all(&header_len.to_le_bytes())?;
    writer.write_all(&header)?;
    for value in sample.as_slice() {
        writer.write_all(&value.to_le_bytes())?;
    }
    writer.flush()?;
    Ok(())
}

pub fn read_npy(path: &Path) -> Result<FrameSample, DatasetError> {
    let bytes = fs::read(path)?;
    if bytes.len() < MAGIC.len() + 4 || &bytes[..MAGIC.len()] != MAGIC {
        return Err(npy_error(path, "missing NUMPY magic"));
    }

    let major = bytes[MAGIC.len()];
    let (header_len, header_start) = match major {
        1 => (
            u16::from_le_bytes([bytes[8], bytes[9]]) as usize,
            10,
        ),
        2 | 3 => {
            if bytes.len() < 12 {
                return Err(npy_error(path, "truncated header"));
            }
            (
                u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize,
                12,
            )
        }
        v => return Err(npy_error(path, format!("unsupported version {}", v))),
    };

    let data_start = header_start + header_len;
    let header = bytes
        .get(header_start..data_start)
        .and_then(|h| std::str::from_utf8(h).ok())
        .ok_or_else(|| npy_error(path, "truncated header"))?;

    if !header.contains("'descr': '<f4'") {
        return Err(npy_error(path, "only little-endian float32 is supported"));
    }
    if !header.contains("'fortran_order': False") {
        return Err(npy_error(path, "fortran order is not supported"));
    }
    let shape = parse_shape(header).ok_or_else(|| npy_error(path, "unreadable shape"))?;
    let [n, h, w, c] = match shape.as_slice() {
        [n, h, w, c] => [*n, *h, *w, *c],
        _ => return Err(npy_error(path, format!("expected 4 dims, got {:?}", shape))),
    };
    if c != 3 {
        return Err(npy_error(path, format!("expected 3 channels, got {}", c)));
    }

    let expected = [h, w, c, 4]
        .iter()
        .try_fold(n, |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| npy_error(path, format!("shape {:?} overflows", shape)))?;
    let payload = &bytes[data_start..];
    if payload.len() != expected {
        return Err(npy_error(
            path,
            format!("payload has {} bytes, shape {:?}", payload.len(), shape),
        ));
    }
    let data = payload
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();

    let width = u32::try_from(w).map_err(|_| npy_error(path, "width overflow"))?;
    let height = u32::try_from(h).map_err(|_| npy_error(path, "height overflow"))?;
    Ok(FrameSample::from_raw(n, width, height, data)?)
}

fn parse_shape(header: &str) -> Option<Vec<usize>> {
    let start = header.find("'shape':")? + "'shape':".len();
    let rest = &header[start..];
    let open = rest.find('(')?;
    let close = rest.find(')')?;
    rest.get(open + 1..close)?
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse().ok())
        .collect()
}
