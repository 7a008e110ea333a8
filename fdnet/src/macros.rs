/// Calls a libc function, turning the `-1` failure sentinel into
/// [`std::io::Error::last_os_error`].
macro_rules! syscall {
  ($fn: ident ( $($arg: expr),* $(,)* ) ) => {{
      #[allow(unused_unsafe)]
      let res = unsafe { libc::$fn($($arg, )*) };
      if res == -1 {
          Err(std::io::Error::last_os_error())
      } else {
          Ok(res)
      }
  }};
}

/// Implements the std descriptor traits for a newtype whose first field
/// derefs to a [`DescriptorHandle`](crate::DescriptorHandle).
macro_rules! impl_native_conversions {
  ($nice:ident) => {
    impl std::os::fd::AsRawFd for $nice {
      fn as_raw_fd(&self) -> std::os::fd::RawFd {
        std::os::fd::AsRawFd::as_raw_fd(&self.0)
      }
    }

    impl std::ops::Deref for $nice {
      type Target = crate::handle::DescriptorHandle;

      fn deref(&self) -> &Self::Target {
        &self.0
      }
    }

    impl crate::handle::AsHandle for $nice {
      fn as_handle(&self) -> &crate::handle::DescriptorHandle {
        &self.0
      }
    }

    impl crate::handle::IntoHandle for $nice {
      fn into_handle(self) -> crate::handle::DescriptorHandle {
        self.0
      }
    }
  };
}
