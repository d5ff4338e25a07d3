//! Process and network probes shared by the integration suites

use std::net::TcpListener;
use url::Url;

pub struct TestHelpers;

impl TestHelpers {
    /// Whether a process with this pid exists (signal 0 probe)
    pub fn pid_alive(pid: u32) -> bool {
        use nix::errno::Errno;
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        !matches!(kill(Pid::from_raw(pid as i32), None), Err(Errno::ESRCH))
    }

    /// A port that was free a moment ago
    pub fn free_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
        listener.local_addr().expect("local addr").port()
    }

    /// GET `<base>/healthz` and return the body
    pub async fn healthz(base: &Url) -> String {
        let target = base.join("/healthz").expect("health url");
        reqwest::get(target)
            .await
            .expect("health request")
            .text()
            .await
            .expect("health body")
    }

    /// Whether anything still accepts connections on the URL's address
    pub fn accepts_connections(url: &Url) -> bool {
        let addr = format!(
            "{}:{}",
            url.host_str().unwrap_or_default(),
            url.port_or_known_default().unwrap_or_default()
        );
        std::net::TcpStream::connect(addr).is_ok()
    }
}
