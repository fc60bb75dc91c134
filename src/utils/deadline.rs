use crate::utils::error::CaneError;
use crate::Result;
use std::time::Duration;

/// 在阻塞线程池中执行一次模型调用，并施加截止时间
///
/// 超时后立即向调用方返回 [`CaneError::Timeout`]；阻塞任务本身无法被中断，
/// 它会在后台跑完，结果被丢弃。请求被取消（future 被 drop）时同理。
pub async fn run_blocking<T, F>(stage: &'static str, deadline: Duration, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let handle = tokio::task::spawn_blocking(f);

    match tokio::time::timeout(deadline, handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) => Err(CaneError::Internal(format!(
            "{} task failed: {}",
            stage, join_err
        ))),
        Err(_) => {
            tracing::error!("{} did not finish within {:?}", stage, deadline);
            Err(CaneError::Timeout {
                stage,
                secs: deadline.as_secs(),
            })
        }
    }
}
