use snafu::Snafu;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("failed to build tokio runtime"))]
    Build {
        #[snafu(source)]
        source: std::io::Error,
        #[snafu(implicit)]
        loc: snafu::Location,
    },
}
