//! Blocking S3 `ListObjectsV2` adapter.

use aws_config::BehaviorVersion;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::Client;
use tokio::runtime::Runtime;

use crate::error::StoreError;
use crate::store::{ListPage, ListRequest, ObjectLister, ObjectSummary};

/// S3-backed [`ObjectLister`].
pub struct S3Lister {
    client: Client,
    runtime: Runtime,
}

impl std::fmt::Debug for S3Lister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Lister").finish_non_exhaustive()
    }
}

impl S3Lister {
    /// Connects using the default credential chain and region.
    pub fn connect() -> Result<Self, StoreError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let sdk_config = runtime.block_on(aws_config::load_defaults(BehaviorVersion::latest()));
        Ok(Self {
            client: Client::new(&sdk_config),
            runtime,
        })
    }

    /// Wraps an existing client and runtime.
    pub fn from_client(client: Client, runtime: Runtime) -> Self {
        Self { client, runtime }
    }
}

fn store_error<E, R>(err: SdkError<E, R>) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let message = DisplayErrorContext(&err).to_string();
    match err.code() {
        Some("NoSuchBucket") => StoreError::NotFound(message),
        Some("SlowDown") => StoreError::Throttled {
            operation: "ListObjectsV2",
            message,
        },
        _ => StoreError::service("ListObjectsV2", message),
    }
}

impl ObjectLister for S3Lister {
    fn list(&self, request: &ListRequest) -> Result<ListPage, StoreError> {
        let call = self
            .client
            .list_objects_v2()
            .bucket(&request.bucket)
            .set_prefix(request.prefix.clone())
            .set_delimiter(request.delimiter.clone())
            .max_keys(i32::try_from(request.max_keys).unwrap_or(i32::MAX))
            .set_continuation_token(request.continuation_token.clone());
        let output = self.runtime.block_on(call.send()).map_err(store_error)?;
        let objects = output
            .contents()
            .iter()
            .filter_map(|object| {
                Some(ObjectSummary {
                    key: object.key()?.to_string(),
                    size: object.size().and_then(|s| u64::try_from(s).ok()).unwrap_or(0),
                    etag: object.e_tag().map(str::to_string),
                    last_modified: object.last_modified().map(|t| t.to_string()),
                })
            })
            .collect();
        Ok(ListPage {
            objects,
            common_prefixes: output
                .common_prefixes()
                .iter()
                .filter_map(|p| p.prefix().map(str::to_string))
                .collect(),
            next_continuation_token: output.next_continuation_token().map(str::to_string),
            is_truncated: output.is_truncated().unwrap_or(false),
        })
    }
}
