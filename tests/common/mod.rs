//! Shared fixtures: in-memory encoders for both archive layouts.
#![allow(dead_code)]

/// Encodes a chunked archive from named blocks of f64 columns.
///
/// Every column must hold `iterations` values; the payload is striped into
/// chunks of `stride` iterations, column-major within each chunk, matching
/// the writer's on-disk order.
pub struct ChunkedArchiveBuilder {
    stride: u64,
    iterations: u64,
    step: f64,
    blocks: Vec<(String, Vec<Vec<f64>>)>,
}

impl ChunkedArchiveBuilder {
    pub fn new(stride: u64, iterations: u64) -> Self {
        Self {
            stride,
            iterations,
            step: 1e-6,
            blocks: Vec::new(),
        }
    }

    pub fn step(mut self, step: f64) -> Self {
        self.step = step;
        self
    }

    pub fn block(mut self, name: &str, columns: Vec<Vec<f64>>) -> Self {
        for col in &columns {
            assert_eq!(col.len() as u64, self.iterations, "column length mismatch");
        }
        self.blocks.push((name.to_owned(), columns));
        self
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut b = Vec::new();
        b.extend_from_slice(b"MCELL_BINARY_API_2");
        b.push(0x00); // reserved byte
        b.extend_from_slice(&1u16.to_le_bytes()); // fixed-step scheme
        b.extend_from_slice(&self.iterations.to_le_bytes());
        b.extend_from_slice(&1u64.to_le_bytes());
        b.extend_from_slice(&self.step.to_le_bytes());
        b.extend_from_slice(&self.stride.to_le_bytes());
        b.extend_from_slice(&(self.blocks.len() as u64).to_le_bytes());

        for (name, columns) in &self.blocks {
            b.extend_from_slice(name.as_bytes());
            b.push(0);
            b.extend_from_slice(&(columns.len() as u64).to_le_bytes());
            for _ in columns {
                b.extend_from_slice(&1u16.to_le_bytes()); // f64 kind
            }
        }

        let all_columns: Vec<&Vec<f64>> = self
            .blocks
            .iter()
            .flat_map(|(_, cols)| cols.iter())
            .collect();
        let stride = if self.stride == 0 {
            self.iterations.max(1)
        } else {
            self.stride
        };
        let mut row = 0u64;
        while row < self.iterations {
            let rows = (self.iterations - row).min(stride);
            for col in &all_columns {
                for r in 0..rows {
                    b.extend_from_slice(&col[(row + r) as usize].to_le_bytes());
                }
            }
            row += rows;
        }
        b
    }
}

/// Encodes a legacy archive. Each block is one contiguous run, u32 or f64
/// per its declared kind; offsets are absolute starting at `base`.
pub struct LegacyArchiveBuilder {
    iterations: u64,
    base: u64,
    step: f64,
    blocks: Vec<(String, LegacyColumn)>,
}

pub enum LegacyColumn {
    Int(Vec<u32>),
    Double(Vec<f64>),
}

impl LegacyColumn {
    fn byte_len(&self) -> u64 {
        match self {
            Self::Int(v) => v.len() as u64 * 4,
            Self::Double(v) => v.len() as u64 * 8,
        }
    }
}

impl LegacyArchiveBuilder {
    pub fn new(iterations: u64) -> Self {
        Self {
            iterations,
            base: 256,
            step: 1e-6,
            blocks: Vec::new(),
        }
    }

    pub fn block(mut self, name: &str, column: LegacyColumn) -> Self {
        let len = match &column {
            LegacyColumn::Int(v) => v.len(),
            LegacyColumn::Double(v) => v.len(),
        };
        assert_eq!(len as u64, self.iterations, "column length mismatch");
        self.blocks.push((name.to_owned(), column));
        self
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut b = Vec::new();
        b.extend_from_slice(b"MCELL_BINARY_API_1");
        b.push(0x00); // reserved byte
        b.extend_from_slice(&self.iterations.to_le_bytes());
        b.extend_from_slice(&(self.blocks.len() as u32).to_le_bytes());
        for (name, _) in &self.blocks {
            b.extend_from_slice(name.as_bytes());
            b.push(0);
        }
        b.extend_from_slice(&0u32.to_le_bytes()); // zero-based fixed-step code
        b.extend_from_slice(&1u64.to_le_bytes());
        b.extend_from_slice(&self.step.to_le_bytes());

        let mut offset = self.base;
        for (_, column) in &self.blocks {
            let kind = match column {
                LegacyColumn::Int(_) => 0u8,
                LegacyColumn::Double(_) => 1u8,
            };
            let end = offset + column.byte_len();
            b.push(kind);
            b.extend_from_slice(&offset.to_le_bytes());
            b.extend_from_slice(&end.to_le_bytes());
            offset = end;
        }

        for (_, column) in &self.blocks {
            match column {
                LegacyColumn::Int(values) => {
                    for v in values {
                        b.extend_from_slice(&v.to_le_bytes());
                    }
                }
                LegacyColumn::Double(values) => {
                    for v in values {
                        b.extend_from_slice(&v.to_le_bytes());
                    }
                }
            }
        }
        b
    }
}

/// A count trace that sits at zero and holds `level` from iteration `at` on.
pub fn step_series(iterations: u64, at: u64, level: f64) -> Vec<f64> {
    (0..iterations)
        .map(|i| if i >= at { level } else { 0.0 })
        .collect()
}

pub fn constant_series(iterations: u64, level: f64) -> Vec<f64> {
    vec![level; iterations as usize]
}
