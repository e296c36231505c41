#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use results_portal::form::{Department, Level, Semester, UploadForm};
use results_portal::pipeline::UploadRequest;
use tempfile::{TempDir, tempdir};

/// A small CSIT ND 1 first-semester sheet in the layout exams officers export.
pub const RESULT_SHEET: &str = "\
Matriculation_Number,COM111_Grade,COM111_Units,GNS101_Grade,GNS101_Units,TGP,GPA,Remarks
FPE/ND/CSIT/2021/001,72,3,58,2,25.5,3.40,Pass
FPE/ND/CSIT/2021/002,45,3,39,2,12.0,1.60,Carry over GNS101
FPE/ND/CSIT/2021/003,81,3,,2,27.0,3.85,Pass
";

pub const TABLE_NAME: &str = "csit_nd_1_first_semester_2023_2024";

pub fn sample_form() -> UploadForm {
    UploadForm::new(Department::Csit, Level::Nd1, Semester::First, "2023/2024")
}

pub fn sheet_request(contents: &str) -> UploadRequest {
    UploadRequest::new(sample_form(), "CSIT ND1 First.csv", contents.as_bytes().to_vec())
}

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Directory handed to `--state-dir`.
    pub fn state_dir(&self) -> PathBuf {
        self.temp_dir.path().join("state")
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }
}
