use std::fs;
use std::io::{self, Read};
use std::path::Path;

use facematch_core::faces::decode_base64_image;

use crate::cli::ImageArgs;
use crate::errors::{AppError, AppResult};

/// Raw image bytes for a command, decoding base64 text when asked to.
pub fn read_image(args: &ImageArgs) -> AppResult<Vec<u8>> {
    let raw = if args.image == Path::new("-") {
        let mut buffer = Vec::new();
        io::stdin()
            .lock()
            .read_to_end(&mut buffer)
            .map_err(|source| AppError::InputRead {
                path: args.image.clone(),
                source,
            })?;
        buffer
    } else {
        fs::read(&args.image).map_err(|source| AppError::InputRead {
            path: args.image.clone(),
            source,
        })?
    };

    if args.base64 {
        Ok(decode_base64_image(&String::from_utf8_lossy(&raw))?)
    } else {
        Ok(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::tempdir;

    #[test]
    fn reads_raw_and_base64_payloads() {
        let dir = tempdir().unwrap();
        let raw_path = dir.path().join("face.bin");
        let b64_path = dir.path().join("face.b64");
        fs::write(&raw_path, [1u8, 2, 3]).unwrap();
        fs::write(&b64_path, "AQID\n").unwrap();

        let raw = read_image(&ImageArgs {
            image: raw_path,
            base64: false,
        })
        .unwrap();
        assert_eq!(raw, vec![1, 2, 3]);

        let decoded = read_image(&ImageArgs {
            image: b64_path,
            base64: true,
        })
        .unwrap();
        assert_eq!(decoded, vec![1, 2, 3]);
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = read_image(&ImageArgs {
            image: PathBuf::from("/nonexistent/facematch/face.png"),
            base64: false,
        })
        .unwrap_err();
        match err {
            AppError::InputRead { path, .. } => {
                assert_eq!(path, PathBuf::from("/nonexistent/facematch/face.png"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn invalid_base64_is_an_extraction_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("face.b64");
        fs::write(&path, "not base64!!").unwrap();

        let err = read_image(&ImageArgs {
            image: path,
            base64: true,
        })
        .unwrap_err();
        assert!(matches!(err, AppError::Extraction(_)));
    }
}
