//! Deployment worker integration tests

mod support;

use std::time::Duration;

use lastdeploy::models::{Job, JobStatus, JobType, ProjectStatus};
use lastdeploy::store::Store;
use lastdeploy::utils::{new_id, now_unix};

use support::{compose_project, dockerfile_project, Harness, TWO_SERVICE_COMPOSE};

fn log_lines(job: &Job) -> Vec<&str> {
    job.log.lines().collect()
}

#[tokio::test]
async fn test_dockerfile_deploy_runs_container() {
    let h = Harness::new();
    let mut project = dockerfile_project("p1", 8080, 8080);
    project.dockerfile_content = "FROM nginx\nEXPOSE 8080\n".to_string();
    h.add_project(project).await;

    let job = h.run_job("p1", JobType::Deploy).await;

    assert_eq!(job.status, JobStatus::Succeeded, "{}", job.log);
    assert_eq!(job.current_step, "docker_run");
    assert!(job.started_at.is_some());
    assert!(job.finished_at.is_some());
    assert!(job.error.is_empty());
    assert_eq!(h.project_status("p1").await, Some(ProjectStatus::Running));

    let repo = h.repo_dir("p1");
    assert_eq!(
        h.engine.calls(),
        vec![
            "remove_containers p1".to_string(),
            format!("build p1 {} Dockerfile", repo.display()),
            "run p1 127.0.0.1:8080->8080/tcp".to_string(),
        ]
    );
    assert_eq!(
        std::fs::read_to_string(repo.join("Dockerfile")).unwrap(),
        "FROM nginx\nEXPOSE 8080\n"
    );

    let lines = log_lines(&job);
    assert!(lines[0].ends_with(" job started"), "{lines:?}");
    assert_eq!(lines[1], "cloning https://git.example.com/p1.git");
    assert_eq!(lines[2], "wrote Dockerfile to Dockerfile");
    assert!(lines[3].ends_with(" job finished"), "{lines:?}");

    let (url, git_ref, dest) = &h.source.syncs()[0];
    assert_eq!(url, "https://git.example.com/p1.git");
    assert_eq!(git_ref, "main");
    assert_eq!(dest, &repo);
}

#[tokio::test]
async fn test_second_deploy_fetches() {
    let h = Harness::new();
    h.add_project(dockerfile_project("p1", 8080, 80)).await;

    h.run_job("p1", JobType::Deploy).await;
    let job = h.run_job("p1", JobType::Deploy).await;

    assert_eq!(job.status, JobStatus::Succeeded);
    assert!(job.log.contains("fetching https://git.example.com/p1.git"));
}

#[tokio::test]
async fn test_subdir_is_build_context() {
    let h = Harness::new();
    let mut project = dockerfile_project("p1", 8080, 80);
    project.repo_subdir = "services/api".to_string();
    h.add_project(project).await;

    h.run_job("p1", JobType::Deploy).await;

    let context = h.repo_dir("p1").join("services").join("api");
    assert!(h
        .engine
        .calls()
        .contains(&format!("build p1 {} Dockerfile", context.display())));
}

#[tokio::test]
async fn test_redelivered_job_is_not_rerun() {
    let h = Harness::new();
    h.add_project(dockerfile_project("p1", 8080, 80)).await;

    let job = h.run_job("p1", JobType::Deploy).await;
    let calls = h.engine.calls();

    h.deployer.process(&job.id).await;

    let again = h.store.get_job(&job.id).await.unwrap();
    assert_eq!(again, job);
    assert_eq!(h.engine.calls(), calls);
}

#[tokio::test]
async fn test_build_failure_fails_job_and_project() {
    let h = Harness::new();
    h.add_project(dockerfile_project("p1", 8080, 80)).await;
    *h.engine.fail_build.lock().unwrap() = Some("exit code 1".to_string());

    let job = h.run_job("p1", JobType::Deploy).await;

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error, "docker build: exit code 1");
    assert_eq!(job.current_step, "docker_build");
    assert!(log_lines(&job)
        .last()
        .unwrap()
        .ends_with(" error: docker build: exit code 1"));
    assert_eq!(h.project_status("p1").await, Some(ProjectStatus::Failed));
    assert!(!h.engine.calls().iter().any(|c| c.starts_with("run ")));
}

#[tokio::test]
async fn test_sync_failure_fails_deploy() {
    let h = Harness::new();
    h.add_project(dockerfile_project("p1", 8080, 80)).await;
    *h.source.fail_with.lock().unwrap() = Some("unknown git_ref: \"main\"".to_string());

    let job = h.run_job("p1", JobType::Deploy).await;

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error, "sync repo: unknown git_ref: \"main\"");
    assert_eq!(job.current_step, "sync_repo");
    assert_eq!(h.project_status("p1").await, Some(ProjectStatus::Failed));
    assert!(h.engine.calls().is_empty());
}

#[tokio::test]
async fn test_traversing_dockerfile_path_is_rejected() {
    let h = Harness::new();
    let mut project = dockerfile_project("p1", 8080, 80);
    project.dockerfile_path = "../p2/Dockerfile".to_string();
    project.dockerfile_content = "FROM scratch\n".to_string();
    h.add_project(project).await;

    let job = h.run_job("p1", JobType::Deploy).await;

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error, "invalid path: contains '..'");
    assert_eq!(job.current_step, "write_config");
    assert!(!h.repo_dir("p2").join("Dockerfile").exists());
    assert_eq!(h.project_status("p1").await, Some(ProjectStatus::Failed));
}

#[tokio::test]
async fn test_dockerfile_lifecycle_operations() {
    let h = Harness::new();
    h.add_project(dockerfile_project("p1", 8080, 80)).await;
    h.run_job("p1", JobType::Deploy).await;

    let cases = [
        (JobType::Stop, "docker_stop", "stopped 1 container(s)", ProjectStatus::Stopped),
        (JobType::Start, "docker_start", "started 1 container(s)", ProjectStatus::Running),
        (JobType::Pause, "docker_pause", "paused 1 container(s)", ProjectStatus::Paused),
        (JobType::Unpause, "docker_unpause", "unpaused 1 container(s)", ProjectStatus::Running),
    ];
    for (job_type, step, line, status) in cases {
        let job = h.run_job("p1", job_type).await;
        assert_eq!(job.status, JobStatus::Succeeded, "{job_type}: {}", job.log);
        assert_eq!(job.current_step, step);
        assert!(job.log.contains(line), "{job_type}: {}", job.log);
        assert_eq!(h.project_status("p1").await, Some(status));
    }

    assert!(h.engine.calls().contains(&"stop p1 10s".to_string()));
    // no rebuild and no source sync outside deploy
    assert_eq!(h.source.syncs().len(), 1);
    assert_eq!(
        h.engine.calls().iter().filter(|c| c.starts_with("build ")).count(),
        1
    );
}

#[tokio::test]
async fn test_compose_deploy_materializes_and_runs_up() {
    let h = Harness::new();
    let mut project = compose_project("c1", "");
    project.compose_content = TWO_SERVICE_COMPOSE.to_string();
    h.add_project(project).await;

    let job = h.run_job("c1", JobType::Deploy).await;

    assert_eq!(job.status, JobStatus::Succeeded, "{}", job.log);
    assert_eq!(job.current_step, "compose_up");
    assert!(job.log.contains("wrote compose file to docker-compose.yml"));
    assert_eq!(h.project_status("c1").await, Some(ProjectStatus::Running));

    let repo = h.repo_dir("c1");
    assert_eq!(
        std::fs::read_to_string(repo.join("docker-compose.yml")).unwrap(),
        TWO_SERVICE_COMPOSE
    );

    let commands = h.runner.commands();
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].program, "docker");
    assert_eq!(commands[0].cwd, repo);
    assert_eq!(
        commands[0].args,
        vec![
            "compose".to_string(),
            "-p".to_string(),
            "last-deploy-c1".to_string(),
            "-f".to_string(),
            repo.join("docker-compose.yml").display().to_string(),
            "up".to_string(),
            "-d".to_string(),
        ]
    );
    assert!(commands[0].override_content.is_none());
    assert!(h.engine.calls().is_empty());
}

#[tokio::test]
async fn test_compose_stop_is_scoped_to_selected_service() {
    let h = Harness::new();
    h.source.with_file("docker-compose.yml", TWO_SERVICE_COMPOSE);
    h.add_project(compose_project("c1", "web")).await;

    let job = h.run_job("c1", JobType::Stop).await;

    assert_eq!(job.status, JobStatus::Succeeded, "{}", job.log);
    assert_eq!(job.current_step, "compose_stop");
    assert_eq!(h.project_status("c1").await, Some(ProjectStatus::Stopped));
    assert_eq!(h.source.syncs().len(), 1);

    let commands = h.runner.commands();
    let args = &commands[0].args;
    assert_eq!(&args[args.len() - 2..], ["stop", "web"]);
    assert_eq!(args.iter().filter(|a| *a == "-f").count(), 2);

    let content = commands[0].override_content.as_deref().unwrap();
    assert!(content.contains("  web:\n"), "{content}");
    assert!(!content.contains("db"), "{content}");
    assert!(content.contains("com.last-deploy.project_id: \"c1\""), "{content}");

    // the override is gone once the command returns
    let tmp = h.dir.path().join("tmp");
    assert_eq!(std::fs::read_dir(tmp).unwrap().count(), 0);
}

#[tokio::test]
async fn test_host_layout_is_not_compose_project_dir_by_default() {
    let h = Harness::with_host_layout(false);
    let mut project = compose_project("c1", "");
    project.repo_subdir = "stack".to_string();
    project.compose_content = TWO_SERVICE_COMPOSE.to_string();
    h.add_project(project).await;

    let job = h.run_job("c1", JobType::Deploy).await;
    assert_eq!(job.status, JobStatus::Succeeded, "{}", job.log);

    let work = h.repo_dir("c1").join("stack");
    let commands = h.runner.commands();
    assert_eq!(commands[0].cwd, work);
    assert!(!commands[0].args.iter().any(|a| a == "--project-directory"));
    assert!(commands[0]
        .args
        .contains(&work.join("docker-compose.yml").display().to_string()));
}

#[tokio::test]
async fn test_host_project_dir_follows_subdir() {
    let h = Harness::with_host_layout(true);
    let mut project = compose_project("c1", "");
    project.repo_subdir = "stack".to_string();
    project.compose_content = TWO_SERVICE_COMPOSE.to_string();
    h.add_project(project).await;

    let job = h.run_job("c1", JobType::Deploy).await;
    assert_eq!(job.status, JobStatus::Succeeded, "{}", job.log);

    let host_work = h.dir.path().join("host").join("repos").join("c1").join("stack");
    let args = &h.runner.commands()[0].args;
    let at = args.iter().position(|a| a == "--project-directory").unwrap();
    assert_eq!(args[at + 1], host_work.display().to_string());
    assert_eq!(args[at + 2], "-f");
    assert_eq!(
        args[at + 3],
        h.repo_dir("c1").join("stack").join("docker-compose.yml").display().to_string()
    );
}

#[tokio::test]
async fn test_compose_failure_keeps_project_status() {
    let h = Harness::new();
    h.add_project(compose_project("c1", "web")).await;
    *h.runner.fail_with.lock().unwrap() = Some("no such service: web\n".to_string());

    let job = h.run_job("c1", JobType::Pause).await;

    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.ends_with("pause web: exit status: 1: no such service: web"), "{}", job.error);
    assert_eq!(h.project_status("c1").await, Some(ProjectStatus::Unknown));
}

#[tokio::test]
async fn test_delete_without_containers_reaches_deleted() {
    let h = Harness::new();
    h.add_project(dockerfile_project("p1", 8080, 80)).await;
    h.run_job("p1", JobType::Deploy).await;
    assert!(h.repo_dir("p1").exists());

    // removed out-of-band
    h.engine.containers.lock().unwrap().clear();

    let job = h.run_job("p1", JobType::Delete).await;

    assert_eq!(job.status, JobStatus::Succeeded, "{}", job.log);
    assert_eq!(job.current_step, "mark_deleted");
    assert_eq!(h.project_status("p1").await, Some(ProjectStatus::Deleted));
    assert!(!h.repo_dir("p1").exists());
    assert!(h.store.get_project("p1").await.unwrap_err().is_not_found());

    let calls = h.engine.calls();
    for expected in ["remove_containers p1", "remove_networks p1", "remove_image p1"] {
        assert!(calls.contains(&expected.to_string()), "{calls:?}");
    }
}

#[tokio::test]
async fn test_delete_swallows_cleanup_errors() {
    let h = Harness::new();
    h.add_project(compose_project("c1", "")).await;
    *h.engine.fail_cleanup.lock().unwrap() = true;

    let job = h.run_job("c1", JobType::Delete).await;

    assert_eq!(job.status, JobStatus::Succeeded, "{}", job.log);
    assert!(job.log.contains("cleanup containers failed: not found: containers already gone"));
    assert!(job.log.contains("cleanup networks failed:"));
    assert!(job.log.contains("cleanup image failed:"));
    assert!(!job.log.contains("cleanup working copy failed"));
    assert_eq!(h.project_status("c1").await, Some(ProjectStatus::Deleted));
    // never shells out to compose
    assert!(h.runner.commands().is_empty());
}

#[tokio::test]
async fn test_unknown_job_type_fails() {
    let h = Harness::new();
    h.add_project(dockerfile_project("p1", 8080, 80)).await;
    let mut job = Job::queued(new_id(), "p1", JobType::Start, now_unix());
    job.job_type = "restart".to_string();
    let job = h.store.create_job(job).await.unwrap();

    h.deployer.process(&job.id).await;

    let job = h.store.get_job(&job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error, "unknown job type: \"restart\"");
    assert!(h.engine.calls().is_empty());
}

#[tokio::test]
async fn test_missing_project_fails() {
    let h = Harness::new();
    let job = h.run_job("ghost", JobType::Start).await;

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error, "not found: project ghost");
}

#[tokio::test]
async fn test_run_loop_drains_queue_until_producers_close() {
    let Harness {
        dir: _dir,
        store,
        engine,
        deployer,
        queue,
        receiver,
        ..
    } = Harness::new();
    store
        .create_project(dockerfile_project("p1", 8080, 80))
        .await
        .unwrap();

    let mut ids = Vec::new();
    for job_type in [JobType::Deploy, JobType::Stop] {
        let job = store
            .create_job(Job::queued(new_id(), "p1", job_type, now_unix()))
            .await
            .unwrap();
        queue.enqueue(&job.id).await.unwrap();
        ids.push(job.id);
    }
    drop(queue);

    let handle = tokio::spawn(async move {
        deployer
            .run(receiver.unwrap(), Box::pin(std::future::pending::<()>()))
            .await;
    });
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();

    for id in &ids {
        assert_eq!(store.get_job(id).await.unwrap().status, JobStatus::Succeeded);
    }
    assert_eq!(
        store.get_project("p1").await.unwrap().last_status,
        ProjectStatus::Stopped
    );
    assert!(engine.calls().contains(&"stop p1 10s".to_string()));
}

#[tokio::test]
async fn test_run_loop_stops_on_shutdown() {
    let mut h = Harness::new();
    h.add_project(dockerfile_project("p1", 8080, 80)).await;
    let job = h.submit("p1", JobType::Deploy).await;
    h.queue.enqueue(&job.id).await.unwrap();

    let receiver = h.receiver.take().unwrap();
    h.deployer
        .run(receiver, Box::pin(std::future::ready(())))
        .await;

    assert_eq!(
        h.store.get_job(&job.id).await.unwrap().status,
        JobStatus::Queued
    );
    assert!(h.engine.calls().is_empty());
}
