fn main() {
  cfg_aliases::cfg_aliases! {
      linux: { target_os = "linux" },
      // Platforms whose sockaddr structs carry a leading length byte.
      sockaddr_len: { any(
        target_vendor = "apple",
        target_os = "freebsd",
        target_os = "openbsd",
        target_os = "netbsd",
        target_os = "dragonfly"
      ) },
  }
}
