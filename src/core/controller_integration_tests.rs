//! 下载任务控制器集成测试
//!
//! 通过可编排的 MockEngine 驱动真实的工作线程，验证暂停、恢复、取消确认
//! 以及终止状态的行为

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::core::manager::DownloadEvent;
    use crate::core::mock_engine::{MockEngine, MockStep, TestHarness, TransferCall};
    use crate::core::models::{AppError, AppResult, EngineError, TaskState};

    fn is_progress(event: &DownloadEvent) -> bool {
        matches!(event, DownloadEvent::TaskProgress { .. })
    }

    fn is_failure(event: &DownloadEvent) -> bool {
        matches!(event, DownloadEvent::TaskFailed { .. })
    }

    fn progress_of(event: &DownloadEvent) -> Option<f64> {
        match event {
            DownloadEvent::TaskProgress { progress, .. } => Some(progress.percent),
            _ => None,
        }
    }

    #[tokio::test]
    async fn test_paused_task_forwards_nothing_until_resumed() -> AppResult<()> {
        let mut h = TestHarness::new(MockEngine::new());
        let (task_id, script) = h.start("clip");

        script.send(MockStep::progress(" 10.0%")).unwrap();
        let first = h.wait_for(is_progress).await;
        assert_eq!(progress_of(&first), Some(10.0));

        h.manager.pause(&task_id)?;
        for percent in [" 20.0%", " 30.0%", " 40.0%"] {
            script.send(MockStep::progress(percent)).unwrap();
        }

        // 暂停期间不应转发任何进度
        let quiet = h.drain_for(Duration::from_millis(200)).await;
        assert!(!quiet.iter().any(is_progress));

        let task = h.manager.task(&task_id).expect("task");
        assert_eq!(task.state, TaskState::Paused);
        assert_eq!(task.last_progress.percent, 10.0);
        assert_eq!(task.status_text, "PAUSED | 10.0%");
        // 暂停时挂起传输，且只挂起一次
        assert_eq!(h.engine.transfer_calls(), vec![TransferCall::Suspend]);

        h.manager.resume(&task_id)?;
        let mut percents = Vec::new();
        while percents.len() < 3 {
            let event = h.wait_for(is_progress).await;
            percents.extend(progress_of(&event));
        }
        assert_eq!(percents, vec![20.0, 30.0, 40.0]);
        assert!(percents.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(
            h.engine.transfer_calls(),
            vec![TransferCall::Suspend, TransferCall::Resume]
        );

        script.send(MockStep::Finish).unwrap();
        h.wait_for(|e| matches!(e, DownloadEvent::TaskCompleted { .. }))
            .await;
        assert_eq!(h.manager.task(&task_id).unwrap().last_progress.percent, 100.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_confirmed_cancel_removes_task_without_error() -> AppResult<()> {
        let mut h = TestHarness::new(MockEngine::new());
        let (task_id, script) = h.start("clip");

        script.send(MockStep::progress(" 5.0%")).unwrap();
        h.wait_for(is_progress).await;

        assert!(h.manager.cancel(&task_id, true)?);
        assert_eq!(h.manager.task(&task_id).unwrap().status_text, "Cancelling...");

        // 下一个进度回调触发停止信号
        script.send(MockStep::progress(" 6.0%")).unwrap();
        let seen = h
            .collect_until(|e| matches!(e, DownloadEvent::TaskRemoved { .. }))
            .await;

        assert!(!seen.iter().any(is_failure));
        assert!(!seen.iter().any(is_progress));
        assert!(!h.manager.has_task(&task_id));
        Ok(())
    }

    #[tokio::test]
    async fn test_cancel_while_paused_wakes_worker() -> AppResult<()> {
        let mut h = TestHarness::new(MockEngine::new());
        let (task_id, script) = h.start("clip");

        script.send(MockStep::progress(" 0.5%")).unwrap();
        h.wait_for(is_progress).await;

        h.manager.pause(&task_id)?;
        script.send(MockStep::progress(" 1.0%")).unwrap();
        h.drain_for(Duration::from_millis(50)).await;

        let pending = h.manager.request_cancel(&task_id)?;
        pending.confirm()?;

        let seen = h
            .collect_until(|e| matches!(e, DownloadEvent::TaskRemoved { .. }))
            .await;
        assert!(seen
            .iter()
            .any(|e| matches!(e, DownloadEvent::TaskCancelling { .. })));
        assert!(!seen.iter().any(is_failure));
        assert!(h.manager.tasks().is_empty());
        // 取消前先恢复被挂起的传输，再由引擎终止
        assert_eq!(
            h.engine.transfer_calls(),
            vec![TransferCall::Suspend, TransferCall::Resume]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_confirmed_cancel_wins_over_engine_outcome() -> AppResult<()> {
        let mut h = TestHarness::new(MockEngine::new());
        let (failing, failing_script) = h.start("failing");
        let (finishing, finishing_script) = h.start("finishing");

        h.manager.cancel(&failing, true)?;
        h.manager.cancel(&finishing, true)?;

        failing_script
            .send(MockStep::Fail(EngineError::Network("aborted".to_string())))
            .unwrap();
        finishing_script.send(MockStep::Finish).unwrap();

        let mut removed = 0;
        while removed < 2 {
            let event = h.next_event().await;
            assert!(!is_failure(&event), "unexpected {:?}", event);
            assert!(!matches!(event, DownloadEvent::TaskCompleted { .. }));
            if matches!(event, DownloadEvent::TaskRemoved { .. }) {
                removed += 1;
            }
        }
        assert!(h.manager.tasks().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_unconfirmed_cancel_leaves_task_running() -> AppResult<()> {
        let mut h = TestHarness::new(MockEngine::new());
        let (task_id, script) = h.start("clip");

        assert!(!h.manager.cancel(&task_id, false)?);

        let asked = std::cell::RefCell::new(Vec::new());
        let answered = h.manager.cancel_with(&task_id, &|question: &str| {
            asked.borrow_mut().push(question.to_string());
            false
        })?;
        assert!(!answered);
        assert_eq!(*asked.borrow(), vec!["Cancel download for clip?".to_string()]);

        let pending = h.manager.request_cancel(&task_id)?;
        pending.dismiss();

        assert_eq!(h.manager.task(&task_id).unwrap().state, TaskState::Running);

        script.send(MockStep::progress(" 50.0%")).unwrap();
        let seen = h.collect_until(is_progress).await;
        assert!(!seen
            .iter()
            .any(|e| matches!(e, DownloadEvent::TaskCancelling { .. })));

        script.send(MockStep::Finish).unwrap();
        h.wait_for(|e| matches!(e, DownloadEvent::TaskCompleted { .. }))
            .await;
        Ok(())
    }

    #[tokio::test]
    async fn test_terminal_states_reject_every_command() -> AppResult<()> {
        let mut h = TestHarness::new(MockEngine::new());
        let (done, done_script) = h.start("done");
        let (broken, broken_script) = h.start("broken");

        done_script.send(MockStep::Finish).unwrap();
        broken_script
            .send(MockStep::Fail(EngineError::Process("exit 1".to_string())))
            .unwrap();

        let mut settled = 0;
        while settled < 2 {
            let event = h.next_event().await;
            if matches!(
                event,
                DownloadEvent::TaskCompleted { .. } | DownloadEvent::TaskFailed { .. }
            ) {
                settled += 1;
            }
        }

        for (task_id, expected) in [(&done, TaskState::Completed), (&broken, TaskState::Failed)] {
            assert!(matches!(h.manager.pause(task_id), Err(AppError::InvalidState(_))));
            assert!(matches!(h.manager.resume(task_id), Err(AppError::InvalidState(_))));
            assert!(h.manager.toggle_pause(task_id).is_err());
            assert!(h.manager.cancel(task_id, true).is_err());
            assert_eq!(h.manager.task(task_id).unwrap().state, expected);
        }

        assert_eq!(h.manager.active_count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_malformed_percent_keeps_last_fraction() -> AppResult<()> {
        let mut h = TestHarness::new(MockEngine::new());
        let (task_id, script) = h.start("clip");

        script.send(MockStep::progress(" 25.0%")).unwrap();
        script.send(MockStep::progress("--%")).unwrap();

        let first = h.wait_for(is_progress).await;
        let second = h.wait_for(is_progress).await;
        assert_eq!(progress_of(&first), Some(25.0));
        assert_eq!(progress_of(&second), Some(25.0));

        let task = h.manager.task(&task_id).unwrap();
        assert_eq!(task.last_progress.percent_text, "--%");
        assert_eq!(task.status_text, "--% | 1.00MiB/s | ETA: 00:10");
        assert_eq!(task.state, TaskState::Running);

        script.send(MockStep::Finish).unwrap();
        h.wait_for(|e| matches!(e, DownloadEvent::TaskCompleted { .. }))
            .await;
        Ok(())
    }

    #[tokio::test]
    async fn test_tasks_are_independent() -> AppResult<()> {
        let mut h = TestHarness::new(MockEngine::new());
        let (first, first_script) = h.start("first");
        let (second, second_script) = h.start("second");

        assert_eq!(h.manager.toggle_pause(&first)?, TaskState::Paused);
        first_script.send(MockStep::progress(" 10.0%")).unwrap();

        second_script.send(MockStep::progress(" 70.0%")).unwrap();
        let event = h.wait_for(is_progress).await;
        assert_eq!(event.task_id(), Some(second.as_str()));

        h.manager.cancel(&second, true)?;
        second_script.send(MockStep::progress(" 80.0%")).unwrap();
        h.wait_for(|e| matches!(e, DownloadEvent::TaskRemoved { .. }))
            .await;

        assert!(!h.manager.has_task(&second));
        let paused = h.manager.task(&first).expect("first task untouched");
        assert_eq!(paused.state, TaskState::Paused);
        assert_eq!(paused.last_progress.percent, 0.0);

        assert_eq!(h.manager.toggle_pause(&first)?, TaskState::Running);
        let event = h.wait_for(is_progress).await;
        assert_eq!(event.task_id(), Some(first.as_str()));

        first_script.send(MockStep::Finish).unwrap();
        h.wait_for(|e| matches!(e, DownloadEvent::TaskCompleted { .. }))
            .await;
        assert_eq!(h.manager.tasks().len(), 1);
        Ok(())
    }
}
