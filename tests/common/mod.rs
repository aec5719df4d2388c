#![allow(dead_code)]

use judgebench::judge::{ChatRequest, ContentPart, JudgeError, MessageContent, Transport};
use judgebench::manifest::{Category, Manifest, Sample};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR\x00\x00\x00\x01\x00\x00\x00\x01";

pub fn sample(index: u64, category: Category, subtask: &str) -> Sample {
    Sample {
        index,
        category,
        subtask: subtask.to_string(),
        instruction: format!("edit sample-{index}"),
        reference: Some(format!("reference for {index}")),
        source_image: None,
        reasoning_image: None,
    }
}

pub fn manifest(samples: Vec<Sample>) -> Manifest {
    Manifest {
        path: PathBuf::from("data_total.json"),
        sha256: "test".into(),
        samples,
    }
}

/// Writes `<root>/<lang>/images/<category>/<index>.png`.
pub fn write_image(root: &Path, lang: &str, category: Category, index: u64) -> PathBuf {
    let dir = root.join(lang).join("images").join(category.as_str());
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(format!("{index}.png"));
    std::fs::write(&path, PNG_BYTES).unwrap();
    path
}

pub fn response(c: u32, r: u32, q: u32) -> String {
    format!("Consistency: {c}\nReasoning: {r}\nQuality: {q}\nRationale: looks right")
}

/// Pulls the `sample-<n>` marker out of the rendered user prompt.
pub fn index_of(req: &ChatRequest) -> u64 {
    for m in &req.messages {
        if let MessageContent::Parts(parts) = &m.content {
            for p in parts {
                if let ContentPart::Text { text } = p {
                    if let Some(pos) = text.find("sample-") {
                        let digits: String = text[pos + 7..]
                            .chars()
                            .take_while(|c| c.is_ascii_digit())
                            .collect();
                        return digits.parse().unwrap();
                    }
                }
            }
        }
    }
    panic!("no sample marker in request");
}

type Responder = dyn Fn(u64, usize) -> Result<String, JudgeError> + Send + Sync;

/// Records every call and answers through a closure of (index, nth call for that index).
pub struct FakeTransport {
    calls: Mutex<Vec<u64>>,
    respond: Box<Responder>,
}

impl FakeTransport {
    pub fn new(respond: impl Fn(u64, usize) -> Result<String, JudgeError> + Send + Sync + 'static) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            respond: Box::new(respond),
        }
    }

    pub fn always(text: &str) -> Self {
        let text = text.to_string();
        Self::new(move |_, _| Ok(text.clone()))
    }

    pub fn calls(&self) -> Vec<u64> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_per_index(&self) -> HashMap<u64, usize> {
        let mut out = HashMap::new();
        for i in self.calls() {
            *out.entry(i).or_insert(0) += 1;
        }
        out
    }
}

impl Transport for FakeTransport {
    fn complete(&self, req: &ChatRequest) -> Result<String, JudgeError> {
        let index = index_of(req);
        let nth = {
            let mut calls = self.calls.lock().unwrap();
            let nth = calls.iter().filter(|i| **i == index).count();
            calls.push(index);
            nth
        };
        (self.respond)(index, nth)
    }
}
