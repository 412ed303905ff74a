use bytes::Bytes;
use headers::HeaderMapExt;
use http::{Request, Response, StatusCode};

use crate::body::Body;
use crate::fs::{FsError, OpenOptions};
use crate::DavResult;

impl crate::DavHandler {
    pub(crate) async fn handle_put(
        &self,
        req: &Request<()>,
        body: Vec<u8>,
    ) -> DavResult<Response<Body>> {
        let path = self.path(req);
        if path.is_collection() {
            return Err(StatusCode::METHOD_NOT_ALLOWED.into());
        }
        // partial updates are not supported.
        if req.headers().typed_get::<headers::ContentRange>().is_some() {
            return Err(StatusCode::NOT_IMPLEMENTED.into());
        }

        let existed = match self.fs.metadata(&path).await {
            Ok(meta) if meta.is_dir() => return Err(StatusCode::METHOD_NOT_ALLOWED.into()),
            Ok(_) => true,
            Err(FsError::NotFound) => {
                if !self.has_parent(&path).await {
                    return Err(StatusCode::CONFLICT.into());
                }
                false
            }
            Err(e) => return Err(e.into()),
        };

        let mut file = self.fs.open(&path, OpenOptions::write()).await?;
        file.write_bytes(Bytes::from(body)).await?;
        file.flush().await?;

        let mut res = Response::new(Body::empty());
        *res.status_mut() = if existed {
            StatusCode::NO_CONTENT
        } else {
            StatusCode::CREATED
        };
        Ok(res)
    }
}
