use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use facemesh_fer::face_detector::{FaceDetector, FaceDetectorConfig};
use facemesh_fer::{Device, EmotionClassifier, Frame, Settings};

#[derive(Parser, Debug)]
#[command(name = "fer")]
#[command(author, version, about = "Face mesh landmarks and facial expression recognition")]
struct Args {
    /// JSON settings file; flags below override its values
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify the expression of pre-cropped face images
    Predict {
        /// ONNX classifier weights
        #[arg(long)]
        weights: Option<PathBuf>,

        #[arg(required = true)]
        images: Vec<PathBuf>,
    },

    /// Print the face detector's proposals for a still image as JSON
    Faces {
        #[arg(long)]
        face_detector: Option<PathBuf>,

        /// Minimum detection confidence
        #[arg(long)]
        confidence: Option<f32>,

        image: PathBuf,
    },

    /// Print the face landmarks found in a still image as JSON
    Landmarks {
        #[arg(long)]
        face_detector: Option<PathBuf>,

        #[arg(long)]
        face_mesh: Option<PathBuf>,

        #[arg(long)]
        max_faces: Option<usize>,

        /// Write the image with the mesh drawn over it
        #[arg(long)]
        annotate: Option<PathBuf>,

        image: PathBuf,
    },

    /// Run the real-time loop in a window (Esc or q quits)
    #[cfg(feature = "opencv")]
    Live {
        /// Video file path or camera index
        #[arg(long, default_value = "0")]
        source: String,

        /// Label faces with their predicted expression
        #[arg(long)]
        emotions: bool,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = Args::parse();
    let settings = match &args.config {
        Some(path) => Settings::load(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => Settings::default(),
    };

    match args.command {
        Command::Predict { weights, images } => predict(settings, weights, &images),
        Command::Faces {
            face_detector,
            confidence,
            image,
        } => {
            let mut settings = settings;
            if let Some(path) = face_detector {
                settings.models.face_detector = path;
            }
            if let Some(confidence) = confidence {
                settings.detector.min_detection_confidence = confidence;
            }

            faces(settings, &image)
        }
        Command::Landmarks {
            face_detector,
            face_mesh,
            max_faces,
            annotate,
            image,
        } => {
            let mut settings = settings;
            if let Some(path) = face_detector {
                settings.models.face_detector = path;
            }
            if let Some(path) = face_mesh {
                settings.models.face_mesh = path;
            }
            if let Some(max_faces) = max_faces {
                settings.detector.max_faces = max_faces;
            }

            landmarks(settings, &image, annotate)
        }
        #[cfg(feature = "opencv")]
        Command::Live { source, emotions } => {
            let mut settings = settings;
            settings.realtime.show_emotions |= emotions;

            live(settings, &source)
        }
    }
}

fn predict(
    mut settings: Settings,
    weights: Option<PathBuf>,
    images: &[PathBuf],
) -> anyhow::Result<()> {
    if let Some(weights) = weights {
        settings.classifier.weights = weights;
    }

    let mut classifier = EmotionClassifier::load(&settings.classifier).with_context(|| {
        format!(
            "failed to load classifier from {}",
            settings.classifier.weights.display()
        )
    })?;

    for path in images {
        let face =
            image::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        let label = classifier.predict(&face)?;

        println!("{}: {}", path.display(), label);
    }

    Ok(())
}

fn faces(settings: Settings, path: &Path) -> anyhow::Result<()> {
    settings.detector.validate()?;

    let config = FaceDetectorConfig::new(
        settings.detector.min_detection_confidence,
        settings.models.layout,
    );
    let mut detector = FaceDetector::new(
        &settings.models.face_detector,
        config,
        Device::select(settings.models.device),
    )
    .context("failed to load face detector")?;

    let rgb = image::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?
        .to_rgb8();
    let dets = detector.detect(&rgb)?;

    log::info!("detector proposed {} faces in {}", dets.len(), path.display());
    println!("{}", serde_json::to_string(&dets)?);

    Ok(())
}

fn landmarks(mut settings: Settings, path: &Path, annotate: Option<PathBuf>) -> anyhow::Result<()> {
    settings.detector.static_image_mode = true;

    let mut detector = facemesh_fer::load_face_mesh(&settings.models, settings.detector.clone())
        .context("failed to load face mesh models")?;

    let rgb = image::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?
        .to_rgb8();
    let result = detector.detect(Frame::from_rgb_image(&rgb), annotate.is_some());

    log::info!("found {} faces in {}", result.len(), path.display());
    println!("{}", serde_json::to_string(&result.faces)?);

    if let Some(out) = annotate {
        result
            .frame
            .to_rgb_image()
            .save(&out)
            .with_context(|| format!("failed to write {}", out.display()))?;
    }

    Ok(())
}

#[cfg(feature = "opencv")]
fn live(settings: Settings, source: &str) -> anyhow::Result<()> {
    use facemesh_fer::video::{VideoSource, Window};
    use facemesh_fer::{EmotionModel, FpsCounter, OnnxEmotionModel, RealtimeLoop};

    let detector = facemesh_fer::load_face_mesh(&settings.models, settings.detector.clone())
        .context("failed to load face mesh models")?;
    let source = VideoSource::open(source)?;
    let window = Window::new("Facial Expression Recognition")?;

    let mut rt = RealtimeLoop::new(source, detector, window)
        .with_fps_counter(FpsCounter::new(settings.realtime.fps_window));

    if settings.realtime.show_emotions {
        let model: Box<dyn EmotionModel> = Box::new(OnnxEmotionModel::load(&settings.classifier)?);
        rt = rt.with_classifier(EmotionClassifier::new(model, &settings.classifier)?);
    }

    let stats = rt.run()?;
    log::info!("displayed {} frames, {} faces", stats.frames, stats.faces);

    Ok(())
}
