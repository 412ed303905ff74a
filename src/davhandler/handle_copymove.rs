use headers::HeaderMapExt;
use http::{Request, Response, StatusCode};

use crate::body::Body;
use crate::davheaders;
use crate::fs::FsError;
use crate::util::DavMethod;
use crate::DavResult;

impl crate::DavHandler {
    pub(crate) async fn handle_copymove(
        &self,
        req: &Request<()>,
        method: DavMethod,
    ) -> DavResult<Response<Body>> {
        let path = self.path(req);
        let dest = self.destination_path(req)?;

        if path == dest {
            return Err(StatusCode::FORBIDDEN.into());
        }

        // source must exist.
        self.fs.metadata(&path).await?;

        let overwrite = req
            .headers()
            .typed_get::<davheaders::Overwrite>()
            .map(|o| o.0)
            .unwrap_or(true);
        let dest_existed = self.fs.metadata(&dest).await.is_ok();
        if dest_existed && !overwrite {
            return Err(StatusCode::PRECONDITION_FAILED.into());
        }
        if !self.has_parent(&dest).await {
            return Err(StatusCode::CONFLICT.into());
        }

        match method {
            DavMethod::Copy => self.fs.copy(&path, &dest).await?,
            DavMethod::Move => {
                self.fs.rename(&path, &dest).await?;
                // locks do not travel: the source tree is gone, so are
                // its locks.
                self.cascade_unlock(&path);
            }
            _ => return Err(FsError::NotImplemented.into()),
        }

        let mut res = Response::new(Body::empty());
        *res.status_mut() = if dest_existed {
            StatusCode::NO_CONTENT
        } else {
            StatusCode::CREATED
        };
        Ok(res)
    }
}
