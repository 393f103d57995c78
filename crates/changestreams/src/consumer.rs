use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::Result;
use crate::records::ReadResult;

/// Receives read results from the change stream.
///
/// `consume` is called concurrently from every partition being read.
/// Implementations needing a total order over their output must serialize
/// internally. Returning an error stops the whole read, and the error is
/// returned from [`Subscriber::subscribe`](crate::Subscriber::subscribe).
#[async_trait]
pub trait Consumer: Send + Sync {
    async fn consume(&self, result: &ReadResult) -> Result<()>;
}

#[async_trait]
impl<C: Consumer + ?Sized> Consumer for Arc<C> {
    async fn consume(&self, result: &ReadResult) -> Result<()> {
        self.as_ref().consume(result).await
    }
}

/// Adapter allowing a plain function to be used as a [`Consumer`].
pub struct ConsumerFn<F>(pub F);

#[async_trait]
impl<F> Consumer for ConsumerFn<F>
where
    F: Fn(&ReadResult) -> Result<()> + Send + Sync,
{
    async fn consume(&self, result: &ReadResult) -> Result<()> {
        (self.0)(result)
    }
}
