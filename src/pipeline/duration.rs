use miette::Context;
use tracing::{debug, info, warn};

use super::{first_success, Resolver, RunReport, SaveLocally, Services};
use crate::{
    result::{Error, Result},
    types::{AssetId, Candidate},
};

/// Finds the duration of every asset that does not have one yet.
pub struct DurationPipeline<'a> {
    services: Services<'a>,
    resolver: Resolver<'a>,
    save_locally: SaveLocally,
}

impl<'a> DurationPipeline<'a> {
    pub fn new(services: Services<'a>, save_locally: SaveLocally) -> Self {
        Self {
            services,
            resolver: Resolver::new(services),
            save_locally,
        }
    }

    /// Make one pass over the pending assets, at most `max` of them.
    ///
    /// Only failing to list the pending assets is an error: failures of
    /// individual assets end up in the report.
    pub fn run(&self, max: Option<usize>) -> miette::Result<RunReport> {
        let pending = self
            .services
            .store
            .pending_durations(max)
            .wrap_err("Could not list events without duration")?;
        info!("{} events without duration", pending.len());

        let mut report = RunReport::default();
        for asset in pending {
            report.record(asset.id, self.process(asset.id));
        }

        info!(
            "Durations: {} found, {} failed",
            report.succeeded.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Return whether a duration was stored.
    fn process(&self, id: AssetId) -> Result<bool> {
        // Read the asset again, it may have been handled since the listing
        let Some(asset) = self.services.store.asset(id)? else {
            return Ok(false);
        };
        if asset.duration.is_some() {
            debug!("Event {id} already has a duration. Skipping it");
            return Ok(false);
        }

        let candidates = self.resolver.candidates(&asset)?;
        let save_locally = self.save_locally.applies_to(asset.visibility);

        let seconds = first_success(&candidates, |candidate| {
            self.extract(candidate, save_locally)
        })?;

        if self.services.store.set_duration(id, seconds)? {
            info!("Event {id} '{}' lasts {seconds}s", asset.title);
            Ok(true)
        } else {
            warn!("Event {id} got a duration while it was being probed");
            Ok(false)
        }
    }

    fn extract(&self, candidate: &Candidate, save_locally: bool) -> Result<u64> {
        let location = self.resolver.resolve(candidate, save_locally)?;
        if location.token.is_some() {
            debug!("{} is read with an access token", location.url);
        }

        let input = location.input();
        match self.services.tool.duration(&input)? {
            Some(seconds) => Ok(seconds),
            None => Err(Error::Extraction { input }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        database::{Sqlite, Store},
        outside::MediaProbeTool,
        settings::Settings,
        testing::{always_ok, ogg_template, vidly_template, FakeHttp, FakeTokenizer, FakeTool},
        types::Visibility,
    };

    const DURATION_1157: &str = "
        Duration: 00:19:17.47, start: 0.000000, bitrate: 1076 kb/s
    ";

    fn settings(scratch: &tempfile::TempDir) -> Settings {
        Settings {
            scratch_dir: Some(scratch.path().to_path_buf()),
            ..Settings::default()
        }
    }

    #[test]
    fn finds_duration_once_a_submission_exists() {
        let scratch = tempfile::tempdir().unwrap();
        let settings = settings(&scratch);
        let db = Sqlite::open_in_memory().unwrap();
        let http = always_ok();
        let tool = FakeTool::new(|url| if url.contains("xyz123") { DURATION_1157 } else { "bla bla" });
        let services = Services {
            store: &db,
            http: &http,
            tool: &tool,
            tokenizer: &FakeTokenizer,
            settings: &settings,
        };

        let id = db
            .insert_asset("Test event", Some(&vidly_template()), &[("tag", "abc123")], Visibility::Public)
            .unwrap();

        let pipeline = DurationPipeline::new(services, SaveLocally::Never);
        let report = pipeline.run(None).unwrap();
        assert_eq!(db.asset(id).unwrap().unwrap().duration, None);
        assert_eq!(report.failed.len(), 1);
        assert!(matches!(report.failed[0].1, Error::Extraction { .. }));

        db.insert_submission(id, "xyz123", true, false, 1).unwrap();
        db.set_template_env(id, &[("tag", "xyz123")]).unwrap();

        let report = pipeline.run(None).unwrap();
        assert_eq!(report.succeeded, vec![id]);
        assert_eq!(db.asset(id).unwrap().unwrap().duration, Some(1157));
        assert_eq!(
            tool.inputs.borrow()[1],
            "http://vid.ly/xyz123?content=video&format=hd_mp4"
        );

        // Nothing left to do
        let report = pipeline.run(None).unwrap();
        assert_eq!(report.considered, 0);
        assert_eq!(tool.calls(), 2);
        assert_eq!(http.heads.borrow().len(), 2);
        assert_eq!(db.asset(id).unwrap().unwrap().duration, Some(1157));
    }

    #[test]
    fn token_only_on_restricted_assets() {
        let scratch = tempfile::tempdir().unwrap();
        let settings = settings(&scratch);
        let db = Sqlite::open_in_memory().unwrap();
        let http = always_ok();
        let tool = FakeTool::new(|_| DURATION_1157);
        let services = Services {
            store: &db,
            http: &http,
            tool: &tool,
            tokenizer: &FakeTokenizer,
            settings: &settings,
        };

        let public = db
            .insert_asset("Public", Some(&vidly_template()), &[("tag", "xyz123")], Visibility::Public)
            .unwrap();
        let restricted = db
            .insert_asset(
                "Company",
                Some(&vidly_template()),
                &[("tag", "xyz123")],
                Visibility::Restricted,
            )
            .unwrap();
        db.insert_submission(public, "xyz123", true, true, 1).unwrap();

        let report = DurationPipeline::new(services, SaveLocally::Never).run(None).unwrap();
        assert_eq!(report.succeeded, vec![public, restricted]);

        let inputs = tool.inputs.borrow();
        assert!(!inputs[0].contains("token="));
        assert!(inputs[1].contains("&token=TOKEN-xyz123"));
    }

    #[test]
    fn not_found_is_reported_and_batch_continues() {
        let scratch = tempfile::tempdir().unwrap();
        let settings = settings(&scratch);
        let db = Sqlite::open_in_memory().unwrap();
        let http = FakeHttp::new(|url| if url.contains("abc123") { (404, None) } else { (200, None) });
        let tool = FakeTool::new(|_| "Duration: 00:10:31.52, start: 0.000000, bitrate: 77 kb/s");
        let services = Services {
            store: &db,
            http: &http,
            tool: &tool,
            tokenizer: &FakeTokenizer,
            settings: &settings,
        };

        let missing = db
            .insert_asset("Test event", Some(&vidly_template()), &[("tag", "abc123")], Visibility::Public)
            .unwrap();
        let ogg = db
            .insert_asset(
                "Ogg",
                Some(&ogg_template()),
                &[("url", "http://videos.m.org/foo.ogg")],
                Visibility::Public,
            )
            .unwrap();

        let report = DurationPipeline::new(services, SaveLocally::Never).run(None).unwrap();

        assert_eq!(db.asset(missing).unwrap().unwrap().duration, None);
        assert_eq!(db.asset(ogg).unwrap().unwrap().duration, Some(631));
        assert_eq!(report.failed.len(), 1);
        assert!(report.to_string().contains("404"));
        assert_eq!(*tool.inputs.borrow(), vec!["http://videos.m.org/foo.ogg"]);
    }

    #[test]
    fn unrecognized_templates_are_skipped() {
        let scratch = tempfile::tempdir().unwrap();
        let settings = settings(&scratch);
        let db = Sqlite::open_in_memory().unwrap();
        let http = always_ok();
        let tool = FakeTool::new(|_| DURATION_1157);
        let services = Services {
            store: &db,
            http: &http,
            tool: &tool,
            tokenizer: &FakeTokenizer,
            settings: &settings,
        };

        let id = db.insert_asset("No template", None, &[], Visibility::Public).unwrap();

        let report = DurationPipeline::new(services, SaveLocally::Never).run(None).unwrap();
        assert_eq!(report.skipped, vec![id]);
        assert!(report.failed.is_empty());
        assert_eq!(tool.calls(), 0);
    }

    #[test]
    fn save_locally_downloads_everything() {
        let scratch = tempfile::tempdir().unwrap();
        let settings = settings(&scratch);
        let db = Sqlite::open_in_memory().unwrap();
        let http = FakeHttp::new(|url| {
            if url.contains("file.mpg") {
                (200, None)
            } else {
                (302, Some("https://otherplace.com/file.mpg"))
            }
        });
        let tool = FakeTool::new(|url| if url.contains("xyz123") { DURATION_1157 } else { "bla bla" });
        let services = Services {
            store: &db,
            http: &http,
            tool: &tool,
            tokenizer: &FakeTokenizer,
            settings: &settings,
        };

        let id = db
            .insert_asset("Test event", Some(&vidly_template()), &[("tag", "abc123")], Visibility::Public)
            .unwrap();
        let pipeline = DurationPipeline::new(services, SaveLocally::All);

        pipeline.run(None).unwrap();
        assert_eq!(db.asset(id).unwrap().unwrap().duration, None);

        db.insert_submission(id, "xyz123", true, false, 1).unwrap();
        db.set_template_env(id, &[("tag", "xyz123")]).unwrap();
        pipeline.run(None).unwrap();
        assert_eq!(db.asset(id).unwrap().unwrap().duration, Some(1157));

        let inputs = tool.inputs.borrow();
        assert_eq!(inputs.len(), 2);
        assert!(inputs[0].ends_with("abc123.mp4"));
        assert!(inputs[1].ends_with("xyz123.mp4"));
        assert_eq!(
            *http.gets.borrow(),
            vec!["https://otherplace.com/file.mpg", "https://otherplace.com/file.mpg"]
        );

        // Scratch files do not outlive the run
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[test]
    fn save_locally_some_downloads_restricted_only() {
        let scratch = tempfile::tempdir().unwrap();
        let settings = settings(&scratch);
        let db = Sqlite::open_in_memory().unwrap();
        let http = FakeHttp::new(|url| {
            if url.contains("file.mp4") {
                (200, None)
            } else {
                (302, Some("https://otherplace.com/file.mp4"))
            }
        });
        let tool = FakeTool::new(|url| {
            if url.contains("otherplace.com/file.mp4") {
                "Duration: 01:05:00.47, start: 0.000000, bitrate: 1076 kb/s"
            } else if url.contains("xyz123") {
                DURATION_1157
            } else {
                "bla bla"
            }
        });
        let services = Services {
            store: &db,
            http: &http,
            tool: &tool,
            tokenizer: &FakeTokenizer,
            settings: &settings,
        };

        let public = db
            .insert_asset("Test event", Some(&vidly_template()), &[("tag", "abc123")], Visibility::Public)
            .unwrap();
        let restricted = db
            .insert_asset(
                "Test event",
                Some(&vidly_template()),
                &[("tag", "xyz123")],
                Visibility::Restricted,
            )
            .unwrap();

        DurationPipeline::new(services, SaveLocally::Restricted)
            .run(None)
            .unwrap();
        assert_eq!(db.asset(public).unwrap().unwrap().duration, Some(3900));
        assert_eq!(db.asset(restricted).unwrap().unwrap().duration, Some(1157));

        let mut inputs = tool.inputs.borrow().clone();
        inputs.sort();
        assert_eq!(inputs.len(), 2);
        assert!(inputs[0].starts_with('/'));
        assert!(inputs[0].ends_with("xyz123.mp4"));
        assert!(inputs[1].starts_with("http://"));
        assert!(inputs[1].ends_with("file.mp4"));
    }

    #[test]
    fn use_https_keeps_the_scheme() {
        let scratch = tempfile::tempdir().unwrap();
        let settings = Settings {
            use_https: true,
            ..settings(&scratch)
        };
        let db = Sqlite::open_in_memory().unwrap();
        let http = always_ok();
        let tool = FakeTool::new(|_| DURATION_1157);
        let services = Services {
            store: &db,
            http: &http,
            tool: &tool,
            tokenizer: &FakeTokenizer,
            settings: &settings,
        };

        db.insert_asset("Test event", Some(&vidly_template()), &[("tag", "xyz123")], Visibility::Public)
            .unwrap();
        DurationPipeline::new(services, SaveLocally::Never).run(None).unwrap();

        assert!(tool.inputs.borrow()[0].starts_with("https://vid.ly/xyz123"));
    }

    #[test]
    fn unreachable_redirect_target_is_downloaded() {
        let scratch = tempfile::tempdir().unwrap();
        let settings = settings(&scratch);
        let db = Sqlite::open_in_memory().unwrap();
        let http = FakeHttp::new(|url| {
            if url.contains("file.mp4") {
                (403, None)
            } else {
                (302, Some("https://otherplace.com/file.mp4"))
            }
        });
        let tool = FakeTool::new(|_| DURATION_1157);
        let services = Services {
            store: &db,
            http: &http,
            tool: &tool,
            tokenizer: &FakeTokenizer,
            settings: &settings,
        };

        let id = db
            .insert_asset("Test event", Some(&vidly_template()), &[("tag", "abc123")], Visibility::Public)
            .unwrap();

        let report = DurationPipeline::new(services, SaveLocally::Never).run(None).unwrap();
        assert_eq!(report.succeeded, vec![id]);
        assert_eq!(db.asset(id).unwrap().unwrap().duration, Some(1157));

        assert_eq!(*http.gets.borrow(), vec!["https://otherplace.com/file.mp4"]);
        let inputs = tool.inputs.borrow();
        assert_eq!(inputs.len(), 1);
        assert!(inputs[0].starts_with('/'));
        assert!(inputs[0].ends_with("abc123.mp4"));

        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[test]
    fn tool_failure_does_not_stop_the_batch() {
        struct Crashing;
        impl MediaProbeTool for Crashing {
            fn duration(&self, input: &str) -> Result<Option<u64>> {
                if input.contains("abc123") {
                    Err(Error::ToolInvocation(miette::miette!("ffmpeg exited with status 1")))
                } else {
                    Ok(Some(7))
                }
            }

            fn screencaptures(
                &self,
                _input: &str,
                _plan: &crate::outside::CapturePlan,
                _output_template: &std::path::Path,
            ) -> Result<()> {
                unreachable!()
            }
        }

        let scratch = tempfile::tempdir().unwrap();
        let settings = settings(&scratch);
        let db = Sqlite::open_in_memory().unwrap();
        let http = always_ok();
        let services = Services {
            store: &db,
            http: &http,
            tool: &Crashing,
            tokenizer: &FakeTokenizer,
            settings: &settings,
        };

        let broken = db
            .insert_asset("Broken", Some(&vidly_template()), &[("tag", "abc123")], Visibility::Public)
            .unwrap();
        let fine = db
            .insert_asset("Fine", Some(&vidly_template()), &[("tag", "xyz123")], Visibility::Public)
            .unwrap();

        let report = DurationPipeline::new(services, SaveLocally::Never).run(None).unwrap();

        assert_eq!(db.asset(broken).unwrap().unwrap().duration, None);
        assert_eq!(db.asset(fine).unwrap().unwrap().duration, Some(7));
        assert_eq!(report.succeeded, vec![fine]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, broken);
        assert!(matches!(report.failed[0].1, Error::ToolInvocation(_)));

        let text = report.to_string();
        assert!(text.starts_with("2 considered, 1 succeeded, 0 skipped, 1 failed"));
        assert!(text.contains(&format!("event {broken}: External tool failed")));
    }
}
