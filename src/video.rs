//! Camera and file capture plus an on-screen window, backed by OpenCV.

use ndarray::{prelude::*, Zip};
use opencv::{core, highgui, imgproc, prelude::*, videoio};

use crate::error::Error;
use crate::frame::{ColorOrder, Frame};
use crate::realtime::{FrameSource, Hud, Surface};

const KEY_ESC: i32 = 27;

/// Frames from a capture device or a video file, BGR ordered.
pub struct VideoSource {
    capture: videoio::VideoCapture,
}

impl VideoSource {
    /// Opens a camera if `src` is a device index, a file otherwise.
    pub fn open(src: &str) -> Result<Self, Error> {
        let capture = match src.parse::<i32>() {
            Ok(index) => {
                log::info!("opening camera {}", index);
                videoio::VideoCapture::new(index, videoio::CAP_ANY)?
            }
            Err(_) => {
                log::info!("opening video file {}", src);
                videoio::VideoCapture::from_file(src, videoio::CAP_ANY)?
            }
        };

        if !capture.is_opened()? {
            return Err(Error::InvalidFrame(format!("unable to open video source {}", src)));
        }

        Ok(Self { capture })
    }
}

impl FrameSource for VideoSource {
    fn read(&mut self) -> Result<Option<Frame>, Error> {
        let mut mat = core::Mat::default();
        if !self.capture.read(&mut mat)? || mat.rows() == 0 || mat.cols() == 0 {
            return Ok(None);
        }

        mat_to_frame(&mat).map(Some)
    }
}

impl Drop for VideoSource {
    fn drop(&mut self) {
        if let Err(err) = self.capture.release() {
            log::warn!("failed to release video source: {}", err);
        }
    }
}

/// Window showing annotated frames; Esc or `q` requests termination.
pub struct Window {
    name: String,
    last_key: i32,
}

impl Window {
    pub fn new(name: &str) -> Result<Self, Error> {
        highgui::named_window(name, highgui::WINDOW_AUTOSIZE)?;

        Ok(Self {
            name: name.to_string(),
            last_key: -1,
        })
    }
}

impl Surface for Window {
    fn render(&mut self, frame: &mut Frame, hud: &Hud) -> Result<(), Error> {
        let mut mat = frame_to_mat(frame)?;
        let green = core::Scalar::new(0.0, 255.0, 0.0, 0.0);

        imgproc::put_text(
            &mut mat,
            &format!("FPS: {}", hud.fps),
            core::Point::new(20, 70),
            imgproc::FONT_HERSHEY_PLAIN,
            1.0,
            green,
            1,
            imgproc::LINE_8,
            false,
        )?;

        for face in &hud.faces {
            if let Some(emotion) = face.emotion {
                let anchor = core::Point::new(face.bbox.left() as i32, face.bbox.top() as i32 - 5);
                imgproc::put_text(
                    &mut mat,
                    emotion.as_str(),
                    anchor,
                    imgproc::FONT_HERSHEY_PLAIN,
                    1.0,
                    green,
                    1,
                    imgproc::LINE_8,
                    false,
                )?;
            }
        }

        highgui::imshow(&self.name, &mat)?;
        self.last_key = highgui::wait_key(1)?;

        Ok(())
    }

    fn should_terminate(&mut self) -> Result<bool, Error> {
        Ok(self.last_key == KEY_ESC || self.last_key == 'q' as i32)
    }
}

impl Drop for Window {
    fn drop(&mut self) {
        let _ = highgui::destroy_window(&self.name);
    }
}

fn mat_to_frame(mat: &core::Mat) -> Result<Frame, Error> {
    if mat.channels() != 3 {
        return Err(Error::InvalidFrame(format!(
            "expected 3 channel capture, got {}",
            mat.channels()
        )));
    }

    let shape = (mat.rows() as usize, mat.cols() as usize, 3);
    let pixels = Array3::from_shape_vec(shape, mat.data_bytes()?.to_vec())?;

    Frame::new(pixels, ColorOrder::Bgr)
}

fn frame_to_mat(frame: &Frame) -> Result<core::Mat, Error> {
    let (w, h) = frame.dims();
    let mut mat = core::Mat::new_rows_cols_with_default(
        h as i32,
        w as i32,
        core::CV_8UC3,
        core::Scalar::all(0.0),
    )?;

    let pixels = frame.pixels();
    let bgr = match frame.order() {
        ColorOrder::Bgr => pixels,
        ColorOrder::Rgb => pixels.slice_move(s![.., .., ..;-1]),
    };

    let mut dst = ArrayViewMut3::from_shape((h as usize, w as usize, 3), mat.data_bytes_mut()?)?;
    Zip::from(&mut dst).and(&bgr).for_each(|d, &s| *d = s);

    Ok(mat)
}
