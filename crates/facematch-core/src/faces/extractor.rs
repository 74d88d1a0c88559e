use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::ExtractionError;

const LANDMARK_ENV: &str = "DLIB_LANDMARK_MODEL";
const ENCODER_ENV: &str = "DLIB_ENCODER_MODEL";
const CNN_ENV: &str = "DLIB_CNN_MODEL";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BoundingBox {
    pub left: i64,
    pub top: i64,
    pub right: i64,
    pub bottom: i64,
}

impl BoundingBox {
    /// Coordinates in top, right, bottom, left order.
    pub fn to_trbl(&self) -> [i64; 4] {
        [self.top, self.right, self.bottom, self.left]
    }
}

/// A located face and its signature. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetectedFace {
    pub region: BoundingBox,
    pub signature: Vec<f64>,
}

pub trait ImageDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<RgbImage, ExtractionError>;
}

/// Decodes any format the `image` crate understands and normalizes to 8-bit RGB.
#[derive(Debug, Clone, Copy, Default)]
pub struct RgbImageDecoder;

impl ImageDecoder for RgbImageDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<RgbImage, ExtractionError> {
        let image = image::load_from_memory(bytes)?;
        Ok(image.to_rgb8())
    }
}

pub trait FeatureExtractor: Send + Sync {
    /// Returns every face found in `image`, in detector order.
    fn detect(&self, image: &RgbImage) -> Result<Vec<DetectedFace>, ExtractionError>;
}

pub fn decode_base64_image(payload: &str) -> Result<Vec<u8>, ExtractionError> {
    let trimmed = payload.trim();
    if trimmed.is_empty() {
        return Err(ExtractionError::EmptyImage);
    }
    Ok(general_purpose::STANDARD.decode(trimmed)?)
}

/// Decode followed by detection, run on the blocking pool.
pub struct FacePipeline<E: ?Sized, D: ?Sized> {
    extractor: Arc<E>,
    decoder: Arc<D>,
}

impl<E: ?Sized, D: ?Sized> Clone for FacePipeline<E, D> {
    fn clone(&self) -> Self {
        Self {
            extractor: Arc::clone(&self.extractor),
            decoder: Arc::clone(&self.decoder),
        }
    }
}

impl<E, D> FacePipeline<E, D>
where
    E: FeatureExtractor + ?Sized + 'static,
    D: ImageDecoder + ?Sized + 'static,
{
    pub fn new(extractor: Arc<E>, decoder: Arc<D>) -> Self {
        Self { extractor, decoder }
    }

    pub async fn detect(&self, image: &[u8]) -> Result<Vec<DetectedFace>, ExtractionError> {
        if image.is_empty() {
            return Err(ExtractionError::EmptyImage);
        }

        let bytes = image.to_vec();
        let extractor = Arc::clone(&self.extractor);
        let decoder = Arc::clone(&self.decoder);
        tokio::task::spawn_blocking(move || {
            let rgb = decoder.decode(&bytes)?;
            debug!(width = rgb.width(), height = rgb.height(), "decoded image");
            let faces = extractor.detect(&rgb)?;
            debug!(faces = faces.len(), "ran feature extractor");
            Ok(faces)
        })
        .await
        .map_err(|err| ExtractionError::Backend(format!("extractor task failed: {err}")))?
    }
}

/// Face detector used ahead of the encoder network.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionModel {
    /// HOG frontal face detector; fast, no extra model file.
    #[default]
    Hog,
    /// dlib MMOD CNN detector; slower but finds more faces.
    Cnn,
}

#[derive(Debug, Clone, Default)]
pub struct FaceModelPaths {
    pub landmark: Option<PathBuf>,
    pub encoder: Option<PathBuf>,
    pub cnn: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedModelPaths {
    pub landmark: PathBuf,
    pub encoder: PathBuf,
    pub cnn: Option<PathBuf>,
}

pub trait ModelPathResolver {
    fn resolve(
        &self,
        configured: &FaceModelPaths,
        model: DetectionModel,
    ) -> Result<ResolvedModelPaths, ExtractionError>;
}

/// Configured paths win, then the `DLIB_*_MODEL` environment variables.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvModelPathResolver;

impl ModelPathResolver for EnvModelPathResolver {
    fn resolve(
        &self,
        configured: &FaceModelPaths,
        model: DetectionModel,
    ) -> Result<ResolvedModelPaths, ExtractionError> {
        let landmark = configured
            .landmark
            .clone()
            .or_else(|| env::var(LANDMARK_ENV).ok().map(PathBuf::from))
            .ok_or(ExtractionError::MissingModel {
                kind: "landmark predictor",
                key: "landmark_model",
                env: LANDMARK_ENV,
            })?;

        let encoder = configured
            .encoder
            .clone()
            .or_else(|| env::var(ENCODER_ENV).ok().map(PathBuf::from))
            .ok_or(ExtractionError::MissingModel {
                kind: "face encoding network",
                key: "encoder_model",
                env: ENCODER_ENV,
            })?;

        let cnn = match model {
            DetectionModel::Hog => None,
            DetectionModel::Cnn => Some(
                configured
                    .cnn
                    .clone()
                    .or_else(|| env::var(CNN_ENV).ok().map(PathBuf::from))
                    .ok_or(ExtractionError::MissingModel {
                        kind: "CNN face detector",
                        key: "cnn_model",
                        env: CNN_ENV,
                    })?,
            ),
        };

        Ok(ResolvedModelPaths {
            landmark,
            encoder,
            cnn,
        })
    }
}

#[cfg(feature = "dlib")]
pub use self::dlib::DlibExtractor;

#[cfg(feature = "dlib")]
mod dlib {
    use std::sync::Mutex;

    use dlib_face_recognition::{
        FaceDetector, FaceDetectorCnn, FaceDetectorTrait, FaceEncoderNetwork, FaceEncoderTrait,
        ImageMatrix, LandmarkPredictor, LandmarkPredictorTrait,
    };
    use image::RgbImage;
    use tracing::debug;

    use super::{BoundingBox, DetectedFace, FeatureExtractor, ResolvedModelPaths};
    use crate::errors::ExtractionError;

    enum Detector {
        Hog(FaceDetector),
        Cnn(FaceDetectorCnn),
    }

    struct Models {
        detector: Detector,
        predictor: LandmarkPredictor,
        encoder: FaceEncoderNetwork,
    }

    /// dlib detector, 68-point landmark predictor and ResNet encoder (128-d signatures).
    pub struct DlibExtractor {
        models: Mutex<Models>,
        jitters: u32,
    }

    impl DlibExtractor {
        pub fn new(paths: &ResolvedModelPaths, jitters: u32) -> Result<Self, ExtractionError> {
            debug!(path = %paths.landmark.display(), "loading landmark model");
            let predictor = LandmarkPredictor::open(&paths.landmark).map_err(|message| {
                ExtractionError::ModelLoad {
                    path: paths.landmark.clone(),
                    message,
                }
            })?;
            debug!(path = %paths.encoder.display(), "loading encoder model");
            let encoder = FaceEncoderNetwork::open(&paths.encoder).map_err(|message| {
                ExtractionError::ModelLoad {
                    path: paths.encoder.clone(),
                    message,
                }
            })?;
            let detector = match &paths.cnn {
                Some(cnn) => {
                    debug!(path = %cnn.display(), "loading CNN detector model");
                    let detector = FaceDetectorCnn::open(cnn).map_err(|message| {
                        ExtractionError::ModelLoad {
                            path: cnn.clone(),
                            message,
                        }
                    })?;
                    Detector::Cnn(detector)
                }
                None => Detector::Hog(FaceDetector::new()),
            };

            Ok(Self {
                models: Mutex::new(Models {
                    detector,
                    predictor,
                    encoder,
                }),
                jitters,
            })
        }
    }

    impl FeatureExtractor for DlibExtractor {
        fn detect(&self, image: &RgbImage) -> Result<Vec<DetectedFace>, ExtractionError> {
            let models = self
                .models
                .lock()
                .map_err(|_| ExtractionError::Backend("dlib model lock poisoned".into()))?;
            let matrix = ImageMatrix::from_image(image);
            let locations = match &models.detector {
                Detector::Hog(detector) => detector.face_locations(&matrix),
                Detector::Cnn(detector) => detector.face_locations(&matrix),
            };

            let mut landmarks = Vec::with_capacity(locations.len());
            for rect in locations.iter() {
                landmarks.push(models.predictor.face_landmarks(&matrix, rect));
            }

            let encodings = models
                .encoder
                .get_face_encodings(&matrix, &landmarks, self.jitters);

            let mut faces = Vec::with_capacity(locations.len());
            for (rect, encoding) in locations.iter().zip(encodings.iter()) {
                faces.push(DetectedFace {
                    region: BoundingBox {
                        left: rect.left,
                        top: rect.top,
                        right: rect.right,
                        bottom: rect.bottom,
                    },
                    signature: encoding.as_ref().to_vec(),
                });
            }

            Ok(faces)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageOutputFormat, Rgb};
    use std::io::Cursor;

    struct FixedExtractor(Vec<DetectedFace>);

    impl FeatureExtractor for FixedExtractor {
        fn detect(&self, _image: &RgbImage) -> Result<Vec<DetectedFace>, ExtractionError> {
            Ok(self.0.clone())
        }
    }

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let image = RgbImage::from_pixel(width, height, Rgb([10, 20, 30]));
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(image)
            .write_to(&mut out, ImageOutputFormat::Png)
            .unwrap();
        out.into_inner()
    }

    fn face(left: i64) -> DetectedFace {
        DetectedFace {
            region: BoundingBox {
                left,
                top: 0,
                right: left + 10,
                bottom: 10,
            },
            signature: vec![0.5, 0.5],
        }
    }

    #[test]
    fn rgb_decoder_normalizes_png_payloads() {
        let rgb = RgbImageDecoder.decode(&png_bytes(3, 2)).unwrap();
        assert_eq!((rgb.width(), rgb.height()), (3, 2));
        assert_eq!(rgb.get_pixel(0, 0), &Rgb([10, 20, 30]));
    }

    #[test]
    fn rgb_decoder_rejects_garbage() {
        let err = RgbImageDecoder.decode(b"definitely not an image").unwrap_err();
        assert!(matches!(err, ExtractionError::Decode(_)));
    }

    #[test]
    fn base64_payloads_are_trimmed_and_decoded() {
        let encoded = format!("  {}\n", general_purpose::STANDARD.encode(b"abc"));
        assert_eq!(decode_base64_image(&encoded).unwrap(), b"abc");
        assert!(matches!(
            decode_base64_image("   "),
            Err(ExtractionError::EmptyImage)
        ));
        assert!(matches!(
            decode_base64_image("***"),
            Err(ExtractionError::Base64(_))
        ));
    }

    #[test]
    fn bounding_box_reports_top_right_bottom_left() {
        let region = BoundingBox {
            left: 4,
            top: 1,
            right: 2,
            bottom: 3,
        };
        assert_eq!(region.to_trbl(), [1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn pipeline_preserves_detector_order() {
        let pipeline = FacePipeline::new(
            Arc::new(FixedExtractor(vec![face(30), face(10), face(20)])),
            Arc::new(RgbImageDecoder),
        );
        let faces = pipeline.detect(&png_bytes(4, 4)).await.unwrap();
        let lefts: Vec<i64> = faces.iter().map(|face| face.region.left).collect();
        assert_eq!(lefts, vec![30, 10, 20]);
    }

    #[tokio::test]
    async fn pipeline_rejects_empty_payload_before_decoding() {
        let pipeline = FacePipeline::new(
            Arc::new(FixedExtractor(vec![face(0)])),
            Arc::new(RgbImageDecoder),
        );
        let err = pipeline.detect(&[]).await.unwrap_err();
        assert!(matches!(err, ExtractionError::EmptyImage));
    }

    #[test]
    fn resolver_prefers_configured_paths() {
        let configured = FaceModelPaths {
            landmark: Some(PathBuf::from("landmark.dat")),
            encoder: Some(PathBuf::from("encoder.dat")),
            cnn: Some(PathBuf::from("cnn.dat")),
        };
        let resolved = EnvModelPathResolver
            .resolve(&configured, DetectionModel::Cnn)
            .unwrap();
        assert_eq!(resolved.landmark, PathBuf::from("landmark.dat"));
        assert_eq!(resolved.cnn, Some(PathBuf::from("cnn.dat")));

        let hog = EnvModelPathResolver
            .resolve(&configured, DetectionModel::Hog)
            .unwrap();
        assert!(hog.cnn.is_none());
    }
}
