use ldbfs_daemon::Config;

/// Shared state handed to every command.
#[derive(Debug, Clone)]
pub struct OpContext {
    /// Configuration after file loading and global flag overrides.
    pub config: Config,
}

impl OpContext {
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

#[async_trait::async_trait]
pub trait Op: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;
    type Output: std::fmt::Display + std::fmt::Debug + Send;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error>;
}

/// Generate a `Command` subcommand enum plus matching `OpError` and
/// `OpOutput` enums, and an `Op` impl that dispatches to each variant.
///
/// Variants may carry attributes such as `#[cfg(...)]`.
#[macro_export]
macro_rules! command_enum {
    ($( $(#[$meta:meta])* ($variant:ident, $op:ty) ),* $(,)?) => {
        #[derive(clap::Subcommand, Debug, Clone)]
        pub enum Command {
            $( $(#[$meta])* $variant($op), )*
        }

        #[derive(Debug, thiserror::Error)]
        pub enum OpError {
            $(
                $(#[$meta])*
                #[error(transparent)]
                $variant(<$op as $crate::cli::op::Op>::Error),
            )*
        }

        #[derive(Debug)]
        pub enum OpOutput {
            $( $(#[$meta])* $variant(<$op as $crate::cli::op::Op>::Output), )*
        }

        impl std::fmt::Display for OpOutput {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $( $(#[$meta])* OpOutput::$variant(output) => write!(f, "{}", output), )*
                }
            }
        }

        #[async_trait::async_trait]
        impl $crate::cli::op::Op for Command {
            type Error = OpError;
            type Output = OpOutput;

            async fn execute(
                &self,
                ctx: &$crate::cli::op::OpContext,
            ) -> Result<Self::Output, Self::Error> {
                match self {
                    $(
                        $(#[$meta])*
                        Command::$variant(op) => op
                            .execute(ctx)
                            .await
                            .map(OpOutput::$variant)
                            .map_err(OpError::$variant),
                    )*
                }
            }
        }
    };
}
