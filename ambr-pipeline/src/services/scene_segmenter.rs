//! Scene Segmenter
//!
//! Partitions a book into scenes from its per-spread descriptors.
//!
//! **Boundary rule:** a new scene opens at spread `k` when, compared with
//! spread `k-1`:
//! - the setting changes (case-insensitive, trimmed), or
//! - the mood changes (case-insensitive, trimmed), or
//! - the intensity moves by at least one level
//!
//! A scene's tags come from its first spread only.

use uuid::Uuid;

use ambr_common::models::{Descriptor, Page, Scene, SceneDescriptors};
use ambr_common::{Error, Result};

/// Two-page analysis window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spread {
    /// 0-based position of the spread in the book
    pub index: u32,
    pub start_page: u32,
    pub end_page: u32,
    /// Page texts joined with a blank line
    pub text: String,
}

/// Group pages into spreads of two, in page order
///
/// A trailing odd page forms a spread on its own.
pub fn build_spreads(pages: &[Page]) -> Vec<Spread> {
    let mut ordered: Vec<&Page> = pages.iter().collect();
    ordered.sort_by_key(|p| p.page_number);

    ordered
        .chunks(2)
        .enumerate()
        .map(|(index, chunk)| Spread {
            index: index as u32,
            start_page: chunk[0].page_number,
            end_page: chunk[chunk.len() - 1].page_number,
            text: chunk
                .iter()
                .map(|p| p.text_content.as_str())
                .collect::<Vec<_>>()
                .join("\n\n"),
        })
        .collect()
}

fn normalized(value: &str) -> String {
    value.trim().to_lowercase()
}

/// True when `current` opens a new scene after `previous`
pub fn is_boundary(previous: &Descriptor, current: &Descriptor) -> bool {
    normalized(&previous.setting) != normalized(&current.setting)
        || normalized(&previous.mood) != normalized(&current.mood)
        || previous.intensity.distance(current.intensity) >= 1
}

/// Build the scenes for a book
///
/// `descriptors[i]` belongs to `spreads[i]`. Scene numbers start at 1. The
/// result covers every spread exactly once.
pub fn segment(book_id: Uuid, spreads: &[Spread], descriptors: &[Descriptor]) -> Result<Vec<Scene>> {
    if spreads.len() != descriptors.len() {
        return Err(Error::Validation(format!(
            "{} spreads but {} descriptors",
            spreads.len(),
            descriptors.len()
        )));
    }

    let mut scenes: Vec<Scene> = Vec::new();
    let mut previous: Option<&Descriptor> = None;

    for (spread, descriptor) in spreads.iter().zip(descriptors) {
        let opens_scene = match previous {
            None => true,
            Some(prev) => is_boundary(prev, descriptor),
        };

        match scenes.last_mut() {
            Some(current) if !opens_scene => {
                current.end_page = spread.end_page;
            }
            _ => {
                let scene_number = scenes.len() as u32 + 1;
                tracing::trace!(
                    book_id = %book_id,
                    scene_number,
                    spread_index = spread.index,
                    start_page = spread.start_page,
                    "Opening scene"
                );
                scenes.push(Scene::new(
                    book_id,
                    scene_number,
                    spread.start_page,
                    spread.end_page,
                    spread.index,
                    SceneDescriptors::from(descriptor),
                    descriptor.prompt(),
                ));
            }
        }

        previous = Some(descriptor);
    }

    Ok(scenes)
}
