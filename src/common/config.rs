// Copyright 2018 The naive-nmt Authors
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::NmtError;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// # Utility to deserialize JSON config files
pub trait Config
where
    for<'de> Self: Deserialize<'de> + Serialize,
{
    /// Loads a `Config` object from a JSON file.
    ///
    /// # Arguments
    ///
    /// * `path` - `Path` to the configuration JSON file.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use naive_nmt::hparams::HParams;
    /// use naive_nmt::Config;
    /// use std::path::Path;
    ///
    /// let config_path = Path::new("path/to/hparams.json");
    /// let hparams = HParams::from_file(config_path)?;
    /// # Ok::<(), naive_nmt::NmtError>(())
    /// ```
    fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, NmtError> {
        let path = path.as_ref();
        let f = File::open(path).map_err(|e| {
            NmtError::IOError(format!(
                "Could not open configuration file {}: {}",
                path.display(),
                e
            ))
        })?;
        let br = BufReader::new(f);
        Ok(serde_json::from_reader(br)?)
    }

    /// Writes the configuration as pretty-printed JSON, used when checkpointing.
    fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), NmtError> {
        let f = File::create(path)?;
        serde_json::to_writer_pretty(BufWriter::new(f), self)?;
        Ok(())
    }
}
