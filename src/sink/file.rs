use super::{SinkError, TabularSink, WriteOutcome, check_shape};
use crate::{
    codec::TabularCodec,
    models::{Cell, Row, SinkWriteRequest, WriteMode, column_index},
};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Local delimited-text files under one directory. Every write rewrites the whole file.
#[derive(Debug, Clone)]
pub struct FileSink {
    dir: PathBuf,
    codec: TabularCodec,
}

impl FileSink {
    pub fn new(dir: impl Into<PathBuf>, codec: TabularCodec) -> Self {
        Self {
            dir: dir.into(),
            codec,
        }
    }

    pub fn path_for(&self, table_name: &str) -> PathBuf {
        self.dir.join(table_name)
    }

    /// Rows already in the file, laid out under `header`. When the file was written with a
    /// different header, cells are moved by column name and columns it lacked stay empty.
    async fn existing_rows(&self, path: &Path, header: &[String]) -> Result<Vec<Row>, SinkError> {
        let text = match tokio::fs::read_to_string(path).await {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(SinkError::Io {
                    path: path.display().to_string(),
                    source,
                });
            }
        };
        let stored = text
            .lines()
            .next()
            .map(|line| self.codec.decode_line(line))
            .unwrap_or_default();
        let layout: Vec<Option<usize>> = if stored.as_slice() == header {
            (0..header.len()).map(Some).collect()
        } else {
            warn!(
                target: "reports.sink",
                path = %path.display(),
                stored = ?stored,
                "file header differs; existing rows realigned by column name"
            );
            header.iter().map(|name| column_index(&stored, name.trim())).collect()
        };
        Ok(self
            .codec
            .decode_document(&text)
            .into_iter()
            .map(|record| {
                layout
                    .iter()
                    .map(|source| {
                        source
                            .and_then(|idx| record.get(idx).cloned())
                            .map(Cell::Text)
                            .unwrap_or_else(Cell::empty)
                    })
                    .collect()
            })
            .collect())
    }
}

#[async_trait]
impl TabularSink for FileSink {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn write(&self, request: SinkWriteRequest) -> Result<WriteOutcome, SinkError> {
        check_shape(&request)?;
        let path = self.path_for(&request.table_name);
        let io = |source: std::io::Error| SinkError::Io {
            path: path.display().to_string(),
            source,
        };

        let written = request.rows.len();
        let rows = match request.mode {
            WriteMode::Overwrite => request.rows,
            WriteMode::Append => {
                let mut rows = self.existing_rows(&path, &request.header).await?;
                rows.extend(request.rows);
                rows
            }
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io)?;
        }
        let text = self.codec.encode_document(&request.header, &rows);
        tokio::fs::write(&path, text).await.map_err(io)?;

        info!(
            target: "reports.sink",
            sink = "file",
            path = %path.display(),
            mode = ?request.mode,
            rows = written,
            total_rows = rows.len(),
            "file written"
        );
        Ok(WriteOutcome {
            deleted: 0,
            written,
        })
    }
}
