use std::{
    fs,
    path::{Path, PathBuf},
};

use miette::{miette, Context, IntoDiagnostic};
use tracing::{debug, info, warn};

use super::{first_success, Resolver, RunReport, Services};
use crate::{
    io::{find_unused_name, scratch_dir},
    outside::{numbered_output, CapturePlan, FRAME_PLACEHOLDER},
    result::{Error, Result},
    types::{AssetId, Candidate, MediaAsset, NewCapture},
};

/// Takes the preview pictures of every asset that has a duration and no
/// picture yet.
pub struct ScreenCapturePipeline<'a> {
    services: Services<'a>,
    resolver: Resolver<'a>,
}

impl<'a> ScreenCapturePipeline<'a> {
    pub fn new(services: Services<'a>) -> Self {
        Self {
            services,
            resolver: Resolver::new(services),
        }
    }

    pub fn run(&self, max: Option<usize>) -> miette::Result<RunReport> {
        let pending = self
            .services
            .store
            .pending_screencaptures(max)
            .wrap_err("Could not list events without pictures")?;
        info!("{} events without pictures", pending.len());

        let mut report = RunReport::default();
        for asset in pending {
            report.record(asset.id, self.process(asset.id));
        }

        info!(
            "Screen captures: {} done, {} failed",
            report.succeeded.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Return whether pictures were added.
    fn process(&self, id: AssetId) -> Result<bool> {
        let store = self.services.store;
        let Some(asset) = store.asset(id)? else {
            return Ok(false);
        };
        let Some(duration) = asset.duration else {
            debug!("Event {id} has no duration yet. Skipping it");
            return Ok(false);
        };
        if store.count_captures(id)? > 0 {
            debug!("Event {id} already has pictures. Skipping it");
            return Ok(false);
        }
        let count = self.services.settings.screencaptures;
        let Some(plan) = CapturePlan::evenly_spaced(duration, count) else {
            debug!("Nothing to capture for event {id}");
            return Ok(false);
        };

        let candidates = self.resolver.candidates(&asset)?;
        let frames = first_success(&candidates, |candidate| {
            self.capture(candidate, &plan, &asset)
        })?;

        // Inserted last to first so that the most recent, listed first, is "Screencap 1"
        let rows: Vec<NewCapture> = frames.iter().rev().cloned().collect();
        if let Err(err) = store.add_captures(&rows) {
            for frame in &frames {
                let _ = fs::remove_file(&frame.file);
            }
            return Err(err.into());
        }

        info!("Added {} pictures to event {id} '{}'", frames.len(), asset.title);
        Ok(true)
    }

    /// Run the tool on one candidate and move its frames to the gallery, in
    /// frame order.
    fn capture(
        &self,
        candidate: &Candidate,
        plan: &CapturePlan,
        asset: &MediaAsset,
    ) -> Result<Vec<NewCapture>> {
        let location = self.resolver.resolve(candidate, false)?;
        let input = location.input();

        let scratch = scratch_dir(self.services.settings.scratch_dir.as_deref())?;
        let template = scratch.path().join(format!("screencap-{FRAME_PLACEHOLDER}.jpg"));
        debug!("Capturing {input} at {:?}", plan.offsets());
        self.services.tool.screencaptures(&input, plan, &template)?;

        let produced: Vec<PathBuf> = (1..=plan.count)
            .map(|n| numbered_output(&template, n))
            .filter(|path| path.is_file())
            .collect();
        if produced.is_empty() {
            return Err(Error::Extraction { input });
        }
        if produced.len() < plan.count as usize {
            warn!(
                "Only {} of {} frames were written for event {}",
                produced.len(),
                plan.count,
                asset.id
            );
        }

        let gallery = self.services.settings.gallery_dir.join(asset.id.to_string());
        fs::create_dir_all(&gallery)?;

        let mut frames = Vec::with_capacity(produced.len());
        for (i, path) in produced.iter().enumerate() {
            match to_gallery(path, &gallery, asset.id, i + 1) {
                Ok(frame) => frames.push(frame),
                Err(err) => {
                    for frame in &frames {
                        let _ = fs::remove_file(&frame.file);
                    }
                    return Err(err);
                }
            }
        }
        Ok(frames)
    }
}

/// Copy a frame out of the scratch directory, under a name not yet taken.
fn to_gallery(
    frame: &Path,
    gallery: &Path,
    asset_id: AssetId,
    position: usize,
) -> Result<NewCapture> {
    let (width, height) = image::image_dimensions(frame)
        .into_diagnostic()
        .wrap_err_with(|| format!("Could not read frame {}", frame.display()))?;

    let dest = find_unused_name(gallery, &format!("screencap-{position}"), "jpg")?;
    let size = fs::copy(frame, &dest)
        .into_diagnostic()
        .wrap_err_with(|| format!("Could not copy frame to {}", dest.display()))?;
    if size == 0 {
        let _ = fs::remove_file(&dest);
        return Err(miette!("Frame {} is empty", frame.display()).into());
    }

    Ok(NewCapture {
        asset_id,
        file: dest,
        width,
        height,
        size,
        notes: format!("Screencap {position}"),
    })
}
