//! In-process fakes for the external collaborators.

use std::{cell::RefCell, io::Cursor, path::Path};

use image::RgbImage;
use miette::miette;

use crate::{
    outside::{
        numbered_output, Body, CapturePlan, HeadResponse, HttpClient, MediaProbeTool, Tokenizer,
    },
    result::Result,
    types::Template,
};

pub fn vidly_template() -> Template {
    Template {
        name: "Vid.ly Something".into(),
        content: "{{ tag }}".into(),
    }
}

pub fn ogg_template() -> Template {
    Template {
        name: "Ogg Video".into(),
        content: r#"<source src="{{ url }}" type="video/ogg" />"#.into(),
    }
}

pub struct FakeTokenizer;

impl Tokenizer for FakeTokenizer {
    fn token(&self, tag: &str) -> Result<Option<String>> {
        Ok(Some(format!("TOKEN-{tag}")))
    }
}

/// HTTP client answering from a routing function.
///
/// `head` maps a URL to (status, Location). Every GET returns `body_len`
/// zero bytes with a matching `Content-Length`.
pub struct FakeHttp<F> {
    head: F,
    pub body_len: usize,
    pub heads: RefCell<Vec<String>>,
    pub gets: RefCell<Vec<String>>,
}

impl<F: Fn(&str) -> (u16, Option<&'static str>)> FakeHttp<F> {
    pub fn new(head: F) -> Self {
        Self {
            head,
            body_len: 100_000,
            heads: RefCell::default(),
            gets: RefCell::default(),
        }
    }
}

/// Every URL answers 200.
pub fn always_ok() -> FakeHttp<impl Fn(&str) -> (u16, Option<&'static str>)> {
    FakeHttp::new(|_| (200, None))
}

impl<F: Fn(&str) -> (u16, Option<&'static str>)> HttpClient for FakeHttp<F> {
    fn head(&self, url: &str) -> Result<HeadResponse> {
        self.heads.borrow_mut().push(url.to_owned());
        let (status, location) = (self.head)(url);
        Ok(HeadResponse {
            status,
            location: location.map(String::from),
        })
    }

    fn get(&self, url: &str) -> Result<Body> {
        self.gets.borrow_mut().push(url.to_owned());
        Ok(Body {
            content_length: Some(self.body_len as u64),
            reader: Box::new(Cursor::new(vec![b'0'; self.body_len])),
        })
    }
}

/// Media tool answering from a routing function and recording every input.
///
/// `durations` maps an input to the diagnostic text the tool would print.
/// Screen captures write small JPEG files of `frame_size`.
pub struct FakeTool<F> {
    durations: F,
    pub frame_size: (u32, u32),
    pub inputs: RefCell<Vec<String>>,
}

impl<F: Fn(&str) -> &'static str> FakeTool<F> {
    pub fn new(durations: F) -> Self {
        Self {
            durations,
            frame_size: (16, 9),
            inputs: RefCell::default(),
        }
    }

    pub fn calls(&self) -> usize {
        self.inputs.borrow().len()
    }
}

impl<F: Fn(&str) -> &'static str> MediaProbeTool for FakeTool<F> {
    fn duration(&self, input: &str) -> Result<Option<u64>> {
        self.inputs.borrow_mut().push(input.to_owned());
        let stderr = (self.durations)(input);
        Ok(crate::outside::parse_duration(stderr))
    }

    fn screencaptures(
        &self,
        input: &str,
        plan: &CapturePlan,
        output_template: &Path,
    ) -> Result<()> {
        self.inputs.borrow_mut().push(input.to_owned());

        let dir = output_template
            .parent()
            .ok_or_else(|| miette!("Output template has no directory"))?;
        assert!(dir.is_dir());

        let (width, height) = self.frame_size;
        for n in 1..=plan.count {
            RgbImage::new(width, height)
                .save(numbered_output(output_template, n))
                .map_err(|e| miette!("{e}"))?;
        }
        Ok(())
    }
}
