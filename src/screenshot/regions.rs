//! Hide, remove and exclude handling around a capture
//!
//! `hide` and `remove` change page styles before the screenshot and are undone
//! afterwards. `exclude` leaves the page alone and paints the matching
//! elements' boxes black on the captured image instead.

use anyhow::{bail, Context, Result};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use serde::Deserialize;
use serde_json::{json, Value};
use std::io::Cursor;
use tracing::{debug, trace};

use crate::screenshot::{CaptureType, CapturedImage, Meta};
use crate::session::Session;

const STYLE_SCRIPT: &str = r#"
const [selectors, property, value, restore] = arguments;
const key = 'vrSaved' + property;
for (const selector of selectors) {
  for (const el of document.querySelectorAll(selector)) {
    if (restore) {
      if (key in el.dataset) {
        el.style[property] = el.dataset[key];
        delete el.dataset[key];
      }
    } else {
      if (!(key in el.dataset)) {
        el.dataset[key] = el.style[property];
      }
      el.style[property] = value;
    }
  }
}
"#;

const RECTS_SCRIPT: &str = r#"
const [selectors, origin] = arguments;
const toRect = (r) => ({ x: r.left, y: r.top, width: r.width, height: r.height });
const rects = [];
for (const selector of selectors) {
  for (const el of document.querySelectorAll(selector)) {
    rects.push(toRect(el.getBoundingClientRect()));
  }
}
const originEl = origin ? document.querySelector(origin) : null;
return {
  ratio: window.devicePixelRatio || 1,
  scrollX: window.scrollX,
  scrollY: window.scrollY,
  origin: originEl ? toRect(originEl.getBoundingClientRect()) : null,
  rects,
};
"#;

/// Area in image pixels
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Layout {
    ratio: f64,
    scroll_x: f64,
    scroll_y: f64,
    origin: Option<Rect>,
    rects: Vec<Rect>,
}

/// Applies `hide` and `remove` styles before capture
pub async fn conceal<S: Session>(session: &mut S, meta: &Meta) -> Result<()> {
    toggle(session, meta, false).await
}

/// Undoes [`conceal`]
pub async fn reveal<S: Session>(session: &mut S, meta: &Meta) -> Result<()> {
    toggle(session, meta, true).await
}

async fn toggle<S: Session>(session: &mut S, meta: &Meta, restore: bool) -> Result<()> {
    if !meta.hide.is_empty() {
        trace!("{} visibility of {:?}", if restore { "Restoring" } else { "Hiding" }, meta.hide);
        session
            .execute(STYLE_SCRIPT, vec![json!(meta.hide), json!("visibility"), json!("hidden"), json!(restore)])
            .await
            .context("Failed to toggle hidden elements")?;
    }
    if !meta.remove.is_empty() {
        trace!("{} display of {:?}", if restore { "Restoring" } else { "Removing" }, meta.remove);
        session
            .execute(STYLE_SCRIPT, vec![json!(meta.remove), json!("display"), json!("none"), json!(restore)])
            .await
            .context("Failed to toggle removed elements")?;
    }
    Ok(())
}

/// Locates the `exclude` selectors in the coordinate space of the captured image
pub async fn excluded_rects<S: Session>(
    session: &mut S,
    capture_type: CaptureType,
    meta: &Meta,
) -> Result<Vec<Rect>> {
    if meta.exclude.is_empty() {
        return Ok(Vec::new());
    }
    let origin = match capture_type {
        CaptureType::Element => json!(meta.element),
        _ => Value::Null,
    };
    let layout = session
        .execute(RECTS_SCRIPT, vec![json!(meta.exclude), origin])
        .await
        .context("Failed to locate excluded elements")?;
    let layout: Layout = serde_json::from_value(layout).context("Unexpected layout probe result")?;
    to_image_space(&layout, capture_type)
}

fn to_image_space(layout: &Layout, capture_type: CaptureType) -> Result<Vec<Rect>> {
    let (dx, dy) = match capture_type {
        CaptureType::Viewport => (0.0, 0.0),
        CaptureType::Document => (layout.scroll_x, layout.scroll_y),
        CaptureType::Element => match layout.origin {
            Some(origin) => (-origin.x, -origin.y),
            None => bail!("captured element is gone, cannot place excluded regions"),
        },
    };
    Ok(layout
        .rects
        .iter()
        .map(|r| Rect {
            x: (r.x + dx) * layout.ratio,
            y: (r.y + dy) * layout.ratio,
            width: r.width * layout.ratio,
            height: r.height * layout.ratio,
        })
        .collect())
}

/// Paints `rects` black and re-encodes the image as PNG
pub fn paint(image: &CapturedImage, rects: &[Rect]) -> Result<CapturedImage> {
    if rects.is_empty() {
        return Ok(image.clone());
    }
    let bytes = image.decode()?;
    let mut canvas = image::load_from_memory(&bytes)
        .context("Failed to decode captured image")?
        .to_rgba8();
    for rect in rects {
        fill(&mut canvas, rect);
    }
    debug!("Painted {} excluded regions", rects.len());

    let mut encoded = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(canvas)
        .write_to(&mut encoded, ImageFormat::Png)
        .context("Failed to encode image")?;
    Ok(CapturedImage::from_raw(encoded.get_ref()))
}

fn fill(canvas: &mut RgbaImage, rect: &Rect) {
    let (width, height) = canvas.dimensions();
    let clamp = |v: f64, max: u32| v.max(0.0).min(max as f64) as u32;
    let (x0, y0) = (clamp(rect.x.floor(), width), clamp(rect.y.floor(), height));
    let (x1, y1) = (
        clamp((rect.x + rect.width).ceil(), width),
        clamp((rect.y + rect.height).ceil(), height),
    );
    for y in y0..y1 {
        for x in x0..x1 {
            canvas.put_pixel(x, y, Rgba([0, 0, 0, 255]));
        }
    }
}
