use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::canvas::Canvas;
use crate::error::OpResult;
use crate::history::{HistoryManager, Snapshot};
use crate::io::{self, IoResult, SaveFormat};
use crate::ops::analysis::Point;
use crate::ops::cancel::CancelFlag;
use crate::ops::histogram::Histogram;
use crate::ops::{OpOutput, Operation};

/// Result of [`Document::apply`].
#[derive(Clone, Debug, PartialEq)]
pub enum Applied {
    /// The current canvas was replaced; the previous one is on the undo stack.
    Image,
    Centroid(Option<Point>),
    Histogram(Histogram),
}

/// Single open document: the current buffer plus its undo history.
#[derive(Debug)]
pub struct Document {
    pub id: Uuid,
    /// Display name (derived from path or "Untitled-X")
    pub name: String,
    /// `None` for unsaved/untitled files.
    pub path: Option<PathBuf>,
    pub current: Canvas,
    pub history: HistoryManager,
    pub is_dirty: bool,
}

impl Document {
    pub fn new(name: impl Into<String>, canvas: Canvas) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            path: None,
            current: canvas,
            history: HistoryManager::default(),
            is_dirty: false,
        }
    }

    pub fn new_untitled(untitled_counter: usize, canvas: Canvas) -> Self {
        Self::new(format!("Untitled-{}", untitled_counter), canvas)
    }

    /// Decode `path` into a fresh document.
    pub fn open(path: &Path) -> IoResult<Self> {
        let canvas = io::load_canvas(path)?;
        let mut doc = Self::new(String::new(), canvas);
        doc.path = Some(path.to_path_buf());
        doc.update_name_from_path();
        Ok(doc)
    }

    pub fn with_history(mut self, history: HistoryManager) -> Self {
        self.history = history;
        self
    }

    /// Run `op` on the current canvas. Image results replace the canvas only
    /// once the operation has succeeded; reports leave it untouched.
    pub fn apply(&mut self, op: &Operation, cancel: &CancelFlag) -> OpResult<Applied> {
        match op.apply(&self.current, cancel)? {
            OpOutput::Image(next) => {
                let previous = std::mem::replace(&mut self.current, next);
                self.history.push(Snapshot::new(op.label(), previous));
                self.mark_dirty();
                log::debug!("{}: applied {}", self.name, op);
                Ok(Applied::Image)
            }
            OpOutput::Centroid(point) => Ok(Applied::Centroid(point)),
            OpOutput::Histogram(hist) => Ok(Applied::Histogram(hist)),
        }
    }

    pub fn undo(&mut self) -> Option<String> {
        let description = self.history.undo(&mut self.current)?;
        self.mark_dirty();
        Some(description)
    }

    pub fn redo(&mut self) -> Option<String> {
        let description = self.history.redo(&mut self.current)?;
        self.mark_dirty();
        Some(description)
    }

    /// Encode the current canvas to `path` and adopt it as the document path.
    pub fn save_as(&mut self, path: &Path, format: SaveFormat, quality: u8) -> IoResult<()> {
        io::save_canvas(&self.current, path, format, quality)?;
        self.path = Some(path.to_path_buf());
        self.update_name_from_path();
        self.mark_clean();
        Ok(())
    }

    pub fn mark_dirty(&mut self) {
        self.is_dirty = true;
    }

    pub fn mark_clean(&mut self) {
        self.is_dirty = false;
    }

    pub fn update_name_from_path(&mut self) {
        if let Some(ref path) = self.path {
            self.name = path
                .file_name()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| "Unknown".to_string());
        }
    }

    /// Get the display title (name with dirty indicator)
    pub fn display_title(&self) -> String {
        if self.is_dirty {
            format!("{}*", self.name)
        } else {
            self.name.clone()
        }
    }
}
