//! Post-export compression of the output file.

use std::{
    fmt,
    fs::File,
    io::{self, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
    str::FromStr,
};

use crate::error::CompressError;

/// zstd level, 0 selects the library default.
const ZSTD_LEVEL: i32 = 0;

/// xz preset, same as the `xz` command line default.
const XZ_PRESET: u32 = 6;

/// Supported compression algorithms.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Compression {
    #[default]
    Gzip,
    Zstd,
    Xz,
}

impl Compression {
    pub const fn name(self) -> &'static str {
        match self {
            Compression::Gzip => "gzip",
            Compression::Zstd => "zstd",
            Compression::Xz => "xz",
        }
    }

    /// File extension appended to the compressed output.
    pub const fn extension(self) -> &'static str {
        match self {
            Compression::Gzip => "gzip",
            Compression::Zstd => "zst",
            Compression::Xz => "xz",
        }
    }

    /// Path of the compressed artifact for `input`.
    pub fn output_path(self, input: &Path) -> PathBuf {
        let mut path = input.as_os_str().to_owned();
        path.push(".");
        path.push(self.extension());
        path.into()
    }

    /// Compresses `input` into `output`, replacing any existing file.
    ///
    /// Blocking, run it on a blocking thread from async code.
    pub fn compress_file(self, input: &Path, output: &Path) -> Result<u64, CompressError> {
        let source = File::open(input).map_err(|source| CompressError::Open {
            path: input.to_path_buf(),
            source,
        })?;
        let dest = File::create(output).map_err(|source| CompressError::Create {
            path: output.to_path_buf(),
            source,
        })?;

        let mut reader = BufReader::new(source);
        let writer = BufWriter::new(dest);
        let copied = match self {
            Compression::Gzip => {
                let mut encoder =
                    flate2::write::GzEncoder::new(writer, flate2::Compression::default());
                let copied = io::copy(&mut reader, &mut encoder)?;
                encoder.finish()?.flush()?;
                copied
            }
            Compression::Zstd => {
                let mut encoder = zstd::Encoder::new(writer, ZSTD_LEVEL)?;
                let copied = io::copy(&mut reader, &mut encoder)?;
                encoder.finish()?.flush()?;
                copied
            }
            Compression::Xz => {
                let mut encoder = xz2::write::XzEncoder::new(writer, XZ_PRESET);
                let copied = io::copy(&mut reader, &mut encoder)?;
                encoder.finish()?.flush()?;
                copied
            }
        };
        Ok(copied)
    }
}

impl FromStr for Compression {
    type Err = CompressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gzip" | "gz" => Ok(Compression::Gzip),
            "zstd" | "zst" => Ok(Compression::Zstd),
            "xz" => Ok(Compression::Xz),
            _ => Err(CompressError::UnsupportedAlgorithm(s.to_string())),
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
