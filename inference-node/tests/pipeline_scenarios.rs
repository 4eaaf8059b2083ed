use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use approx::assert_relative_eq;
use async_trait::async_trait;
use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
use soilsense_common::{CropPrediction, PredictionRequest, SoilResultRecord, SoilTexture, NO_CROP};
use soilsense_inference::config::PrefilterConfig;
use soilsense_inference::inference::{
    CropClassifier, ImageModel, LabelIndex, NpkPhTextureFeatures, SoilClassifier, TabularModel,
};
use soilsense_inference::prefilter::SoilColorPrefilter;
use soilsense_inference::relationships::RelationshipTable;
use soilsense_inference::{ImageSource, Pipeline, PipelineError, ResultSink, Result};

const SOIL_CLASSES: [&str; 4] = ["Clay_Trained", "Loamy_Trained", "Sandy_Trained", "Silt_Trained"];
const CROPS: [&str; 3] = ["maize", "no_crop", "rice"];
const RELATIONSHIPS: &str = "Crops,Helps,Avoid\nMaize,\"Beans, Squash\",Tomato\nRice,,Wheat\n";

fn png(color: [u8; 3]) -> Vec<u8> {
    let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 16, Rgb(color)));
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)
        .unwrap();
    bytes
}

struct StaticImage(Vec<u8>);

#[async_trait]
impl ImageSource for StaticImage {
    async fn fetch(&self, _location: &str) -> Result<Vec<u8>> {
        Ok(self.0.clone())
    }
}

struct UnreachableImage;

#[async_trait]
impl ImageSource for UnreachableImage {
    async fn fetch(&self, location: &str) -> Result<Vec<u8>> {
        Err(PipelineError::IoError(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            location.to_string(),
        )))
    }
}

struct SoilModel {
    probabilities: Vec<f32>,
    calls: AtomicUsize,
}

impl SoilModel {
    fn new(probabilities: Vec<f32>) -> Arc<Self> {
        Arc::new(Self {
            probabilities,
            calls: AtomicUsize::new(0),
        })
    }
}

impl ImageModel for SoilModel {
    fn predict(&self, _image: &DynamicImage) -> Result<Option<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Some(self.probabilities.clone()))
    }
}

struct CropModel {
    probabilities: Vec<f32>,
    rows: Mutex<Vec<Vec<f32>>>,
}

impl CropModel {
    fn new(probabilities: Vec<f32>) -> Arc<Self> {
        Arc::new(Self {
            probabilities,
            rows: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

impl TabularModel for CropModel {
    fn input_width(&self) -> Option<usize> {
        Some(8)
    }

    fn predict_proba(&self, features: &[f32]) -> Result<Vec<f32>> {
        self.rows.lock().unwrap().push(features.to_vec());
        Ok(self.probabilities.clone())
    }
}

#[derive(Default)]
struct RecordingSink {
    records: Mutex<Vec<SoilResultRecord>>,
}

#[async_trait]
impl ResultSink for RecordingSink {
    async fn append(&self, record: &SoilResultRecord) -> Result<()> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

struct BrokenSink;

#[async_trait]
impl ResultSink for BrokenSink {
    async fn append(&self, _record: &SoilResultRecord) -> Result<()> {
        Err(PipelineError::PersistenceError("connection refused".to_string()))
    }
}

fn pipeline(
    images: Arc<dyn ImageSource>,
    soil: Arc<SoilModel>,
    crop: Arc<CropModel>,
    sink: Arc<dyn ResultSink>,
) -> Pipeline {
    let soil = SoilClassifier::new(soil, SOIL_CLASSES.iter().map(|s| s.to_string()).collect(), 0.5);
    let crop = CropClassifier::new(
        crop,
        Box::new(NpkPhTextureFeatures),
        LabelIndex::new(CROPS.iter().map(|s| s.to_string()).collect()),
        0.5,
    );
    let relationships = RelationshipTable::from_reader(RELATIONSHIPS.as_bytes()).unwrap();
    Pipeline::new(images, soil, crop, relationships, sink)
}

fn request(n: f64, p: f64, k: f64, ph: f64) -> PredictionRequest {
    PredictionRequest {
        image_url: "https://images.example.org/pots/bed-3.jpg?size=large".to_string(),
        image_name: None,
        n,
        p,
        k,
        ph,
        pot_name: "bed-3".to_string(),
    }
}

fn soil_image() -> Arc<dyn ImageSource> {
    Arc::new(StaticImage(png([120, 80, 40])))
}

#[tokio::test]
async fn test_clay_sample_gets_confident_crop_with_companions() {
    let crop_model = CropModel::new(vec![0.82, 0.08, 0.10]);
    let sink = Arc::new(RecordingSink::default());
    let pipeline = pipeline(
        soil_image(),
        SoilModel::new(vec![0.9, 0.05, 0.03, 0.02]),
        crop_model.clone(),
        sink.clone(),
    );

    let result = pipeline.predict("user-7", &request(17.0, 20.0, 44.0, 4.9)).await.unwrap();

    assert_eq!(result.soil_texture, SoilTexture::Clay);
    assert_relative_eq!(result.converted_values.n, 58.65, epsilon = 1e-9);
    assert_relative_eq!(result.converted_values.p, 69.0, epsilon = 1e-9);
    assert_relative_eq!(result.converted_values.k, 151.8, epsilon = 1e-9);
    assert_eq!(result.converted_values.ph, 4.9);
    assert_eq!(
        result.crop,
        CropPrediction::Crop {
            label: "maize".to_string(),
            confidence: 0.82
        }
    );
    assert_eq!(result.companions, vec!["beans", "squash"]);
    assert_eq!(result.avoids, vec!["tomato"]);

    let rows = crop_model.rows.lock().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(&rows[0][4..], &[1.0, 0.0, 0.0, 0.0]);

    let records = sink.records.lock().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].user_id, "user-7");
    assert_eq!(records[0].image_name, "bed-3.jpg");
    assert_eq!(records[0].prediction, "Clay");
    assert_eq!(records[0].recommended_crop, "maize");
    assert_eq!(records[0].n, 17.0);
}

#[tokio::test]
async fn test_clay_sample_with_unsure_crop_model() {
    let pipeline = pipeline(
        soil_image(),
        SoilModel::new(vec![0.9, 0.05, 0.03, 0.02]),
        CropModel::new(vec![0.4, 0.25, 0.35]),
        Arc::new(RecordingSink::default()),
    );

    let result = pipeline.predict("user-7", &request(17.0, 20.0, 44.0, 4.9)).await.unwrap();

    assert_eq!(result.soil_texture, SoilTexture::Clay);
    assert_eq!(result.crop, CropPrediction::NoCrop);
    assert!(result.companions.is_empty());
    assert!(result.avoids.is_empty());

    let body = serde_json::to_value(&result).unwrap();
    assert_eq!(body["recommended_crop"], NO_CROP);
    assert!(body["confidence"].is_null());
}

#[tokio::test]
async fn test_unsure_soil_model_echoes_raw_values() {
    let crop_model = CropModel::new(vec![0.9, 0.05, 0.05]);
    let pipeline = pipeline(
        soil_image(),
        SoilModel::new(vec![0.3, 0.25, 0.25, 0.2]),
        crop_model.clone(),
        Arc::new(RecordingSink::default()),
    );

    let result = pipeline.predict("user-7", &request(17.0, 20.0, 44.0, 4.9)).await.unwrap();

    assert_eq!(result.soil_texture, SoilTexture::NoSoilDetected);
    assert_eq!(result.crop, CropPrediction::NoCrop);
    assert_eq!(result.converted_values.n, 17.0);
    assert_eq!(result.converted_values.p, 20.0);
    assert_eq!(result.converted_values.k, 44.0);
    assert_eq!(result.converted_values.ph, 4.9);
    assert_eq!(crop_model.calls(), 0);

    let body = serde_json::to_value(&result).unwrap();
    assert_eq!(body["soil_texture"], "No soil detected");
}

#[tokio::test]
async fn test_out_of_range_reading_skips_crop_model() {
    let crop_model = CropModel::new(vec![0.9, 0.05, 0.05]);
    let pipeline = pipeline(
        soil_image(),
        SoilModel::new(vec![0.9, 0.05, 0.03, 0.02]),
        crop_model.clone(),
        Arc::new(RecordingSink::default()),
    );

    let result = pipeline.predict("user-7", &request(180.0, 20.0, 44.0, 6.5)).await.unwrap();

    assert_eq!(result.soil_texture, SoilTexture::Clay);
    assert_relative_eq!(result.converted_values.n, 621.0, epsilon = 1e-9);
    assert_eq!(result.crop, CropPrediction::NoCrop);
    assert!(result.companions.is_empty() && result.avoids.is_empty());
    assert_eq!(crop_model.calls(), 0);
}

#[tokio::test]
async fn test_sink_failure_does_not_change_result() {
    let reference = pipeline(
        soil_image(),
        SoilModel::new(vec![0.9, 0.05, 0.03, 0.02]),
        CropModel::new(vec![0.82, 0.08, 0.10]),
        Arc::new(RecordingSink::default()),
    );
    let broken = pipeline(
        soil_image(),
        SoilModel::new(vec![0.9, 0.05, 0.03, 0.02]),
        CropModel::new(vec![0.82, 0.08, 0.10]),
        Arc::new(BrokenSink),
    );

    let req = request(17.0, 20.0, 44.0, 4.9);
    let expected = reference.predict("user-7", &req).await.unwrap();
    let actual = broken.predict("user-7", &req).await.unwrap();

    assert_eq!(actual, expected);
}

#[tokio::test]
async fn test_fetch_failure_is_classification_failure() {
    let soil_model = SoilModel::new(vec![0.9, 0.05, 0.03, 0.02]);
    let pipeline = pipeline(
        Arc::new(UnreachableImage),
        soil_model.clone(),
        CropModel::new(vec![0.9, 0.05, 0.05]),
        Arc::new(RecordingSink::default()),
    );

    let err = pipeline
        .predict("user-7", &request(17.0, 20.0, 44.0, 4.9))
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::ClassificationFailed(_)));
    assert_eq!(soil_model.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_undecodable_image_is_classification_failure() {
    let pipeline = pipeline(
        Arc::new(StaticImage(b"definitely not a picture".to_vec())),
        SoilModel::new(vec![0.9, 0.05, 0.03, 0.02]),
        CropModel::new(vec![0.9, 0.05, 0.05]),
        Arc::new(RecordingSink::default()),
    );

    let err = pipeline
        .predict("user-7", &request(17.0, 20.0, 44.0, 4.9))
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::ClassificationFailed(_)));
}

#[tokio::test]
async fn test_repeated_requests_give_identical_results() {
    let sink = Arc::new(RecordingSink::default());
    let pipeline = pipeline(
        soil_image(),
        SoilModel::new(vec![0.1, 0.7, 0.1, 0.1]),
        CropModel::new(vec![0.1, 0.1, 0.8]),
        sink.clone(),
    );

    let req = request(30.0, 12.0, 50.0, 6.2);
    let first = pipeline.predict("user-7", &req).await.unwrap();
    let second = pipeline.predict("user-7", &req).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.soil_texture, SoilTexture::Loamy);
    assert_eq!(first.crop.label(), "rice");
    assert_eq!(first.avoids, vec!["wheat"]);
    assert_eq!(sink.records.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_prefilter_rejects_before_the_soil_model() {
    let soil_model = SoilModel::new(vec![0.9, 0.05, 0.03, 0.02]);
    let prefilter = SoilColorPrefilter::new(PrefilterConfig {
        enabled: true,
        ..PrefilterConfig::default()
    });
    let pipeline = pipeline(
        Arc::new(StaticImage(png([20, 60, 220]))),
        soil_model.clone(),
        CropModel::new(vec![0.9, 0.05, 0.05]),
        Arc::new(RecordingSink::default()),
    )
    .with_prefilter(Some(prefilter));

    let result = pipeline.predict("user-7", &request(17.0, 20.0, 44.0, 4.9)).await.unwrap();

    assert_eq!(result.soil_texture, SoilTexture::NoSoilDetected);
    assert_eq!(soil_model.calls.load(Ordering::SeqCst), 0);
}
