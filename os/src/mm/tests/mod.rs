//! 按需调页变体的宿主机测试
