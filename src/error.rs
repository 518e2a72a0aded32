use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("registry file not found: {0}")]
    RegistryNotFound(PathBuf),

    #[error("failed to read registry {path}: {message}")]
    RegistryRead { path: PathBuf, message: String },

    #[error("registry is missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("input directory not found: {0}")]
    InputDir(PathBuf),

    /// 解压后没有任何 .shp 文件
    #[error("未找到.shp文件")]
    NoGeometryFile,

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("undefined coordinate reference system")]
    UndefinedCrs,

    #[error("{0}")]
    Engine(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(feature = "gdal")]
impl From<gdal::errors::GdalError> for Error {
    fn from(err: gdal::errors::GdalError) -> Self {
        Error::Engine(err.to_string())
    }
}
